//! Bounded retry with linear backoff for transfer attempts.
//!
//! Attempts run strictly one after another. Between attempt `i` and `i + 1`
//! (1-indexed) the controller sleeps `backoff_unit * i`. There is no jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Retry configuration, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Base unit of the linear backoff (default: 2 seconds).
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Create a new policy.
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff_unit,
        }
    }

    /// Sleep duration after the given failed attempt (1-indexed).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

/// Terminal failure after every permitted attempt failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// The error returned by the final attempt, unchanged.
    pub last_error: E,
    /// Total number of attempts made.
    pub attempts: u32,
}

/// Runs an operation under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    /// Create a controller for the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Execute `operation` until it succeeds or `max_attempts` is reached.
    ///
    /// The closure receives the 1-indexed attempt number. Every failure is
    /// logged; only the last one is returned.
    pub async fn run_with_retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "attempt succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "attempt failed");
                    if attempt >= max_attempts {
                        return Err(Exhausted {
                            last_error: e,
                            attempts: attempt,
                        });
                    }
                    tokio::time::sleep(self.policy.backoff_after(attempt)).await;
                }
            }
        }
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
