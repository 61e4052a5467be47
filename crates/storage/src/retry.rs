use crate::error::{ErrorKind, Result};
use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry policy for object-store transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub const ONCE: Self = Self {
        attempts: 1,
        delay: Duration::ZERO,
    };

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the attempts run out. `operation` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= attempts {
                return Err(match attempts {
                    1 => err,
                    _ => err.raise(ErrorKind::Exhausted(attempts)),
                });
            }
            tracing::warn!(attempt, attempts, error = ?err, "transfer attempt failed, retrying");
            tokio::time::sleep(self.delay).await;
            attempt += 1;
        }
    }
}
