//! Bounded retry of units of work that lost a write race

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tracing::warn;

use super::error::LendingResult;

/// Retry configuration for conflicting units of work
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_interval: Duration,
    /// Maximum backoff duration
    pub max_interval: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create an ExponentialBackoff from this config
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            // attempts are bounded by count; the request deadline bounds time
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// uses up `config.max_attempts` attempts. The last error is returned.
pub async fn retry_conflicts<T, Fut, F>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> LendingResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = LendingResult<T>>,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        match operation().await {
            Err(e) if e.is_retryable_conflict() => {
                if attempts >= config.max_attempts {
                    warn!(
                        operation = %operation_name,
                        attempts = attempts,
                        error = %e,
                        "Unit of work still conflicting after max retries"
                    );
                    return Err(e);
                }

                match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(
                            operation = %operation_name,
                            attempt = attempts,
                            error = %e,
                            retry_in_ms = duration.as_millis() as u64,
                            "Unit of work conflicted, retrying"
                        );
                        tokio::time::sleep(duration).await;
                    }
                    None => return Err(e),
                }
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lending::LendingError;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert!(config.to_backoff().max_elapsed_time.is_none());
    }

    #[tokio::test]
    async fn test_conflict_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_conflicts(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LendingError::Conflict("books/b1".into()))
                } else {
                    Ok(7)
                }
            },
            &fast(),
            "test",
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: LendingResult<()> = retry_conflicts(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LendingError::Unavailable("busy".into()))
            },
            &fast(),
            "test",
        )
        .await;

        assert_matches!(result, Err(LendingError::Unavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: LendingResult<()> = retry_conflicts(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LendingError::BookUnavailable("b1".into()))
            },
            &fast(),
            "test",
        )
        .await;

        assert_matches!(result, Err(LendingError::BookUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
