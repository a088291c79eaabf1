//! Exponential backoff retry logic for directory and identity-store calls.

use crate::error::{ApiError, SyncError, SyncResult};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Cap for a single delay, including server-supplied ones.
    pub max_delay: Duration,
    /// Total time budget for one call, retries included.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with the given max retries and base delay.
    /// The delay cap and elapsed budget keep their defaults.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Whether the error should be retried at the given attempt number.
    #[must_use]
    pub fn should_retry<E: ApiError>(&self, attempt: u32, error: &E) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Calculate delay for the given attempt.
    ///
    /// A server-supplied `retry_after` wins (capped at `max_delay`); otherwise
    /// the delay is `min(base_delay * 2^attempt, max_delay)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(delay) => delay.min(self.max_delay),
            None => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(self.max_delay),
        }
    }

    /// Execute an async operation with retry.
    ///
    /// Non-transient errors are returned immediately, translated through
    /// [`SyncError::from_api`]. Transient errors are retried until
    /// `max_retries` or `max_elapsed` is exhausted, at which point a
    /// [`SyncError::TransientApi`] carrying the attempt count is returned.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, mut f: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: ApiError,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_transient() {
                        return Err(SyncError::from_api(&error));
                    }

                    let delay = self.delay_for(attempt, error.retry_after());
                    let budget_left = started.elapsed() + delay <= self.max_elapsed;
                    if !self.should_retry(attempt, &error) || !budget_left {
                        warn!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            error = %error,
                            "Retry budget exhausted"
                        );
                        return Err(SyncError::TransientApi {
                            attempts: attempt + 1,
                            message: format!("{operation_name}: {error}"),
                        });
                    }

                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
