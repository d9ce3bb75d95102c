//! Bounded retry for AI service calls.
//!
//! Only transport-level failures are worth a second attempt; an HTTP-level
//! rejection (bad key, malformed prompt, quota) will not improve by
//! resending. Errors are classified before any delay is spent, and
//! non-transient ones propagate immediately. Delays double per attempt up
//! to a cap, starting from the configured base.

use log::warn;
use tokio::time::{Duration, sleep};

use crate::Result;
use crate::config::AiConfig;
use crate::error::OptimarrError;

/// Retry behavior for one AI client.
#[derive(Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry; doubles each further attempt.
    pub base_delay: Duration,
    /// Cap on the per-attempt delay.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Derive retry behavior from the AI configuration section.
    pub fn from_ai_config(config: &AiConfig) -> Self {
        Self {
            // retry_attempts counts retries; attempts include the first try.
            max_attempts: config.retry_attempts as usize + 1,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Whether a failure is worth retrying at all.
///
/// Everything the HTTP client surfaces as a transport problem arrives as
/// `AiService`; config and parse errors are deterministic and final.
fn is_transient(error: &OptimarrError) -> bool {
    matches!(error, OptimarrError::AiService(_))
}

/// Run `operation` up to `config.max_attempts` times, backing off between
/// transient failures. Non-transient errors and the final failure are
/// returned as-is.
pub async fn retry_transient<F, Fut, T>(operation: F, config: &RetryConfig) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.base_delay;
    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && is_transient(&error) => {
                warn!(
                    "AI request attempt {}/{} failed ({}); retrying in {:?}",
                    attempt, max_attempts, error, delay
                );
                sleep(delay).await;
                delay = std::cmp::min(delay * 2, config.max_delay);
            }
            Err(error) => return Err(error),
        }
    }
    unreachable!("loop returns on every attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick_config(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_retried_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let operation = || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(OptimarrError::ai_service("connection reset"))
                } else {
                    Ok("recovered")
                }
            }
        };
        let result = retry_transient(operation, &quick_config(3)).await;
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let operation = || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(OptimarrError::ai_service("still down"))
            }
        };
        assert!(retry_transient(operation, &quick_config(2)).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_fails_fast() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let operation = || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(OptimarrError::config("missing key"))
            }
        };
        assert!(retry_transient(operation, &quick_config(5)).await.is_err());
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "deterministic failures are not retried"
        );
    }

    #[test]
    fn test_config_derivation_counts_first_attempt() {
        let ai = AiConfig {
            retry_attempts: 2,
            retry_delay_ms: 250,
            ..Default::default()
        };
        let config = RetryConfig::from_ai_config(&ai);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(250));
    }
}
