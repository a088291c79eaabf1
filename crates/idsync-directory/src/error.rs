//! Error types for the directory client.

use idsync_core::{ApiError, ApiErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `DirectoryError`.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Google error reasons that signal quota exhaustion on a 403.
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded", "quotaExceeded"];

/// Errors that can occur when talking to the Directory API.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Configuration validation error (credentials document, URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OAuth2` authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Directory API returned an error status.
    #[error("Directory API error {status}: {message}")]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Signing the service-account assertion failed.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl ApiError for DirectoryError {
    fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Config(_) | Self::Url(_) | Self::Jwt(_) => ApiErrorKind::Configuration,
            Self::Auth(_) => ApiErrorKind::Authentication,
            Self::RateLimited { .. } => ApiErrorKind::Transient,
            Self::Api { status, reason, .. } => match status {
                401 => ApiErrorKind::Authentication,
                403 if reason
                    .as_deref()
                    .is_some_and(|r| RATE_LIMIT_REASONS.contains(&r)) =>
                {
                    ApiErrorKind::Transient
                }
                408 | 429 | 500..=599 => ApiErrorKind::Transient,
                _ => ApiErrorKind::Permanent,
            },
            Self::Http(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                ApiErrorKind::Transient
            }
            Self::Http(_) | Self::Json(_) => ApiErrorKind::Permanent,
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
