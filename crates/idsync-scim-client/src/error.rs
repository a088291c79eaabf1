//! Error types for the SCIM client.

use idsync_core::{ApiError, ApiErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `ScimClientError`.
pub type ScimClientResult<T> = Result<T, ScimClientError>;

/// Errors returned by the SCIM identity store.
#[derive(Debug, Error)]
pub enum ScimClientError {
    /// Bearer token rejected (401).
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Resource already exists (409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited (429).
    #[error("Rate limited by SCIM target")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success SCIM response.
    #[error("SCIM error {status}: {detail}")]
    ScimError { status: u16, detail: String },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Response body could not be decoded.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ScimClientError {
    /// Whether the failure happened before the target produced a response.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Whether the target answered with a 5xx status.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ScimError { status, .. } if (500..=599).contains(status))
    }
}

impl ApiError for ScimClientError {
    fn kind(&self) -> ApiErrorKind {
        match self {
            Self::AuthError(_) => ApiErrorKind::Authentication,
            Self::InvalidConfig(_) => ApiErrorKind::Configuration,
            Self::ScimError { status: 408, .. } => ApiErrorKind::Transient,
            _ if self.is_retryable() || self.is_server_error() => ApiErrorKind::Transient,
            _ => ApiErrorKind::Permanent,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            ScimClientError::AuthError("401".into()).kind(),
            ApiErrorKind::Authentication
        );
        assert_eq!(
            ScimClientError::Conflict("dup".into()).kind(),
            ApiErrorKind::Permanent
        );
        assert_eq!(
            ScimClientError::NotFound("gone".into()).kind(),
            ApiErrorKind::Permanent
        );
        assert_eq!(
            ScimClientError::ScimError {
                status: 503,
                detail: "unavailable".into()
            }
            .kind(),
            ApiErrorKind::Transient
        );
        assert_eq!(
            ScimClientError::ScimError {
                status: 400,
                detail: "bad".into()
            }
            .kind(),
            ApiErrorKind::Permanent
        );
        assert_eq!(
            ScimClientError::ScimError {
                status: 403,
                detail: "forbidden".into()
            }
            .kind(),
            ApiErrorKind::Permanent
        );
    }

    #[test]
    fn test_rate_limited_retry_after() {
        let err = ScimClientError::RateLimited {
            retry_after_secs: Some(3),
        };
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }
}
