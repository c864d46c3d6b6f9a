//! Bounded exponential-backoff retry for single requests.

use crate::error::TransportError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a retried operation ended without producing a value
#[derive(Debug, Clone)]
pub enum RetryError {
    /// Every attempt failed with a transient error
    Exhausted { attempts: u32, last: TransportError },
    /// A non-transient error, returned without retrying
    Permanent(TransportError),
    /// The run was cancelled while waiting or in flight
    Cancelled,
}

/// Retry settings for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub min_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.min_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// attempts or `cancel` fires
    ///
    /// The operation receives the 1-based attempt number. Cancellation drops
    /// the in-flight attempt or backoff sleep immediately.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                outcome = operation(attempt) => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_transient() {
                debug!(target_label = label, attempt, error = %error, "Permanent failure, not retrying");
                return Err(RetryError::Permanent(error));
            }

            if attempt >= max_attempts {
                warn!(target_label = label, attempts = attempt, error = %error, "Giving up after retries");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay_after(attempt);
            warn!(
                target_label = label,
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "Request failed, retrying after delay"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
