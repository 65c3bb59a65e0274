//! Bounded retry with a fixed wait between attempts.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Wait before retrying a transient failure.
    pub retry_delay: Duration,
    /// Wait before retrying a failure that looks like a rate or token limit.
    pub rate_limit_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_secs(10),
            rate_limit_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Set the delay used for transient failures.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the delay used for rate-limit failures.
    #[must_use]
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    fn delay_for<E: Retryable>(&self, error: &E) -> Duration {
        if error.is_rate_limited() {
            self.rate_limit_delay
        } else {
            self.retry_delay
        }
    }
}

/// Retry result indicating what happened.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success { value: T, attempts: u32 },
    /// Operation failed after all retries.
    Failed { last_error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Convert to a Result, discarding retry information.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failed { last_error, .. } => Err(last_error),
        }
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. } | RetryResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Determines if an error is retryable.
pub trait Retryable {
    /// Returns true if the operation should be retried.
    fn is_retryable(&self) -> bool;

    /// Returns true if the failure was caused by a rate or token limit.
    fn is_rate_limited(&self) -> bool {
        false
    }
}

/// Execute an async operation, retrying retryable failures up to `max_attempts`.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(value) => return RetryResult::Success { value, attempts },
            Err(error) => {
                if attempts >= config.max_attempts || !error.is_retryable() {
                    return RetryResult::Failed {
                        last_error: error,
                        attempts,
                    };
                }

                let delay = config.delay_for(&error);
                tracing::warn!(
                    attempt = attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %error,
                    "operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.0.contains("transient") || self.0.contains("limit")
        }

        fn is_rate_limited(&self) -> bool {
            self.0.contains("limit")
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts)
            .with_retry_delay(Duration::from_millis(10))
            .with_rate_limit_delay(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast_config(2), |_| async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>("success")
        })
        .await;

        assert_eq!(result.attempts(), 1);
        assert_eq!(result.into_result().unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_failure_retried_once() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast_config(2), |_| async {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TestError("transient error".to_string()))
            } else {
                Ok("success")
            }
        })
        .await;

        assert_eq!(result.attempts(), 2);
        assert!(result.into_result().is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_two_failures_propagate() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast_config(2), |_| async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError("transient error".to_string()))
        })
        .await;

        match result {
            RetryResult::Failed { attempts, .. } => assert_eq!(attempts, 2),
            _ => panic!("expected failure"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let counter = AtomicU32::new(0);
        let result = with_retry(&fast_config(3), |_| async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError("permanent error".to_string()))
        })
        .await;

        assert_eq!(result.attempts(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_uses_longer_delay() {
        let start = tokio::time::Instant::now();
        let counter = AtomicU32::new(0);
        let _ = with_retry(&fast_config(2), |_| async {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TestError("token limit".to_string()))
            } else {
                Ok(())
            }
        })
        .await;

        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryConfig::new(0).max_attempts, 1);
    }
}
