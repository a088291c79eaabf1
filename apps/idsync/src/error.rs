//! Process-level errors and exit codes.

use idsync_core::SyncError;
use thiserror::Error;

/// Exit codes
/// - 0: Clean run
/// - 1: Fatal error (configuration, authentication, fetch)
/// - 2: Run completed with per-entity failures
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{failed} operation(s) failed")]
    PartialFailure { failed: u32 },

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Sync(_) | AppError::Internal(_) => 1,
            AppError::PartialFailure { .. } => 2,
        }
    }
}
