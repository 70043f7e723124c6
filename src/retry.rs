//! Timeout and bounded retry for collaborator calls.

use crate::error::TaskError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Per-call timeout plus exponential backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Limit on a single attempt.
    pub timeout: Duration,
    /// Delay before the second attempt; doubles afterwards.
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds or attempts run out.
    ///
    /// Stops early on errors for which `should_retry` returns false.
    /// Timeouts are always retried. The last failure is returned as
    /// [`TaskError::Dependency`].
    pub async fn run<T, E, F, Fut, R>(
        &self,
        operation: &str,
        mut call: F,
        should_retry: R,
    ) -> Result<T, TaskError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
        R: Fn(&E) -> bool,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let (failure, retryable) = match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    let retryable = should_retry(&e);
                    (BoxError::from(e), retryable)
                }
                Err(_) => (
                    BoxError::from(format!("timed out after {:?}", self.timeout)),
                    true,
                ),
            };

            if !retryable || attempt >= attempts {
                return Err(TaskError::Dependency {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: failure,
                });
            }

            let delay = self.delay_after(attempt);
            warn!(
                "{} failed (attempt {}/{}): {}; retrying in {:?}",
                operation, attempt, attempts, failure, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
