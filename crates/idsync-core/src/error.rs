//! Error taxonomy for a reconciliation run.
//!
//! Client crates keep their own error enums and classify each error through
//! [`ApiError`]. The engine only ever reasons about [`SyncError`], which
//! separates fatal categories (the run stops) from per-entity categories (the
//! failure lands in the run summary and the run continues).

use std::time::Duration;
use thiserror::Error;

/// Result type alias using `SyncError`.
pub type SyncResult<T> = Result<T, SyncError>;

/// Classification of an error returned by an external API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The client itself is misconfigured (bad credentials document, bad URL).
    Configuration,
    /// Credentials or access token were rejected.
    Authentication,
    /// Rate limiting, server-side failure, timeout or connection failure.
    Transient,
    /// Malformed request, not found, conflict, forbidden.
    Permanent,
}

/// Errors raised by the directory and identity-store clients.
pub trait ApiError: std::error::Error + Send + Sync + 'static {
    /// How the engine should react to this error.
    fn kind(&self) -> ApiErrorKind;

    /// Server-supplied retry delay, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Whether retrying the same call may succeed.
    fn is_transient(&self) -> bool {
        self.kind() == ApiErrorKind::Transient
    }
}

/// Errors that can occur during a reconciliation run.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Missing or invalid filter, credential or option. Fatal.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Credentials or access token rejected by either API. Fatal.
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Rate limited or server-side failure that outlived the retry budget.
    #[error("Transient API error after {attempts} attempt(s): {message}")]
    TransientApi { attempts: u32, message: String },

    /// Malformed request, not found, conflict or forbidden.
    #[error("API error: {message}")]
    PermanentApi { message: String },

    /// A source record cannot be mapped into the provisioned shape.
    #[error("Mapping error for '{entity}': {message}")]
    MappingInvariantViolation { entity: String, message: String },

    /// A snapshot could not be fetched completely. Fatal.
    #[error("Failed to fetch {side} snapshot: {message}")]
    Fetch { side: String, message: String },

    /// The operation was not started because the run was cancelled.
    #[error("Operation cancelled before it started")]
    Cancelled,
}

impl SyncError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a permanent API error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::PermanentApi {
            message: message.into(),
        }
    }

    /// Create a mapping invariant violation.
    pub fn mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MappingInvariantViolation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a fetch-phase error.
    pub fn fetch(side: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            side: side.into(),
            message: message.into(),
        }
    }

    /// Translate a client error into the run taxonomy.
    ///
    /// Transient errors map to a single-attempt `TransientApi`; the retry
    /// policy produces the final attempt count when it gives up.
    pub fn from_api<E: ApiError>(error: &E) -> Self {
        match error.kind() {
            ApiErrorKind::Configuration => Self::configuration(error.to_string()),
            ApiErrorKind::Authentication => Self::authentication(error.to_string()),
            ApiErrorKind::Transient => Self::TransientApi {
                attempts: 1,
                message: error.to_string(),
            },
            ApiErrorKind::Permanent => Self::permanent(error.to_string()),
        }
    }

    /// Whether this error must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Authentication { .. } | Self::Fetch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("test error ({0:?})")]
    struct TestError(ApiErrorKind);

    impl ApiError for TestError {
        fn kind(&self) -> ApiErrorKind {
            self.0
        }
    }

    #[test]
    fn test_from_api_maps_each_kind() {
        assert!(matches!(
            SyncError::from_api(&TestError(ApiErrorKind::Configuration)),
            SyncError::Configuration { .. }
        ));
        assert!(matches!(
            SyncError::from_api(&TestError(ApiErrorKind::Authentication)),
            SyncError::Authentication { .. }
        ));
        assert!(matches!(
            SyncError::from_api(&TestError(ApiErrorKind::Transient)),
            SyncError::TransientApi { attempts: 1, .. }
        ));
        assert!(matches!(
            SyncError::from_api(&TestError(ApiErrorKind::Permanent)),
            SyncError::PermanentApi { .. }
        ));
    }

    #[test]
    fn test_fatal_categories() {
        assert!(SyncError::configuration("missing endpoint").is_fatal());
        assert!(SyncError::authentication("bad token").is_fatal());
        assert!(SyncError::fetch("directory", "timeout").is_fatal());

        assert!(!SyncError::permanent("conflict").is_fatal());
        assert!(!SyncError::mapping("user-1", "no email").is_fatal());
        assert!(!SyncError::Cancelled.is_fatal());
        assert!(!SyncError::TransientApi {
            attempts: 3,
            message: "503".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_display_includes_entity() {
        let err = SyncError::mapping("abc123", "primary email is missing");
        assert_eq!(
            err.to_string(),
            "Mapping error for 'abc123': primary email is missing"
        );
    }
}
