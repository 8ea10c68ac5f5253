//! Bounded retry with exponential backoff for feed requests
//!
//! **Algorithm:**
//! 1. Attempt the operation, bounded by the per-attempt timeout
//! 2. On success, return the result
//! 3. On a retryable error with attempts left: log WARN, sleep, double the
//!    backoff (capped), retry
//! 4. On a non-retryable error or when attempts are exhausted: return the
//!    last error

use crate::error::{FeedError, FeedResult};
use obdl_common::config::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy applied to one logical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: settings.initial_backoff,
            max_backoff: settings.max_backoff.max(settings.initial_backoff),
            attempt_timeout,
        }
    }

    /// One attempt, no backoff
    pub fn single_attempt(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            attempt_timeout,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Backoff slept after the given failed attempt (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    /// Run `operation` under this policy
    ///
    /// # Arguments
    /// * `operation_name` - Name for logging (e.g., "fetch events")
    /// * `operation` - Closure producing a fresh request future per attempt
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> FeedResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FeedResult<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(FeedError::Timeout(self.attempt_timeout)),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let backoff = self.backoff_after(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Request failed, will retry after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    if attempt > 1 {
                        warn!(
                            operation = operation_name,
                            attempt,
                            error = %err,
                            "Request failed, giving up"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            &RetrySettings {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(
            &RetrySettings {
                max_attempts: 10,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_millis(500),
            },
            Duration::from_secs(1),
        );
        assert_eq!(policy.backoff_after(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_after(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_after(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast_policy(3)
            .run("test", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, FeedError>(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast_policy(3)
            .run("test", || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(FeedError::Status { status: 502, url: "u".into() })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: FeedResult<()> = fast_policy(2)
            .run("test", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(FeedError::Status { status: 500, url: "u".into() }) }
            })
            .await;
        assert!(matches!(result, Err(FeedError::Status { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: FeedResult<()> = fast_policy(5)
            .run("test", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(FeedError::Decode("not json".into())) }
            })
            .await;
        assert!(matches!(result, Err(FeedError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let policy = RetryPolicy::single_attempt(Duration::from_millis(10));
        let result: FeedResult<()> = policy
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(FeedError::Timeout(_))));
    }
}
