//! Retry with exponential backoff for provider calls
//!
//! Transient errors are retried up to `max_attempts` total calls, sleeping
//! `backoff_base_ms`, then double that, and so on, capped at
//! `backoff_max_ms`. Permanent errors return immediately.

use std::time::Duration;
use symloc_common::config::RetryConfig;

use crate::providers::ProviderError;

/// Outcome of a retried operation with the number of calls made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ProviderError>,
    pub attempts: u32,
}

/// Backoff before retry number `retry` (1-based)
pub fn backoff_delay(policy: &RetryConfig, retry: u32) -> Duration {
    let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    let delay_ms = policy.backoff_base_ms.saturating_mul(factor).min(policy.backoff_max_ms);
    Duration::from_millis(delay_ms)
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
pub async fn retry_transient<F, Fut, T>(operation_name: &str, policy: &RetryConfig, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Provider call succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = backoff_delay(policy, attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient provider error, will retry after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Provider call failed: retry attempts exhausted"
                    );
                }
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff_base_ms: 5,
            backoff_max_ms: 20,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryConfig {
            max_attempts: 10,
            backoff_base_ms: 100,
            backoff_max_ms: 1000,
        };
        assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&policy, 5), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&policy, 80), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let outcome = retry_transient("test_op", &fast_policy(3), || async { Ok::<i32, ProviderError>(42) }).await;
        assert_eq!(outcome.result.unwrap(), 42);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = retry_transient("test_op", &fast_policy(3), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::Transient("429".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(outcome.result.unwrap(), 7);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: RetryOutcome<()> = retry_transient("test_op", &fast_policy(2), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Transient("timeout".to_string()))
            }
        })
        .await;

        assert!(outcome.result.unwrap_err().is_transient());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: RetryOutcome<()> = retry_transient("test_op", &fast_policy(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Permanent("bad schema".to_string()))
            }
        })
        .await;

        assert!(!outcome.result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
