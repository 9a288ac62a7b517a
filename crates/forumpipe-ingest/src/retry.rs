//! Fixed-delay retry policy
//!
//! Applied around a bare fallible call; the caller decides which errors are
//! retryable. Metrics and transformation stay outside the retried closure.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::{DEFAULT_FETCH_MAX_ATTEMPTS, DEFAULT_FETCH_RETRY_DELAY_SECS};

/// Bounded attempts with a fixed delay between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_FETCH_MAX_ATTEMPTS,
            Duration::from_secs(DEFAULT_FETCH_RETRY_DELAY_SECS),
        )
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The closure receives the 1-based attempt number.
    ///
    /// The error of the last attempt is returned unchanged.
    pub async fn run<T, E, F, Fut, P>(&self, operation: &str, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    error!(
                        operation,
                        attempts = attempt,
                        error = %e,
                        "Final attempt failed"
                    );
                    return Err(e);
                },
                Err(e) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed. Retrying in {:?}",
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                },
            }
        }
    }
}
