//! Bounded exponential backoff for transient faults.
//!
//! Used around uploads and order writes. Callers pass a predicate so explicit
//! generator failures and caller errors are returned immediately.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay, doubled on every retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Name used in logs.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or the retry budget is spent. The last error is returned.
pub async fn retry_async<F, Fut, T, E, P>(
    config: &RetryConfig,
    is_transient: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries && is_transient(&e) => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt > 0 {
                    warn!(
                        "{} failed after {} attempts: {}",
                        config.operation_name,
                        attempt + 1,
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_doubles_and_caps() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(30), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let config = RetryConfig::new("upload").with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = retry_async(
            &config,
            |_: &&str| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("503")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let config = RetryConfig::new("upload").with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), &str> = retry_async(
            &config,
            |e: &&str| *e != "forbidden",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("forbidden") }
            },
        )
        .await;

        assert_eq!(result, Err("forbidden"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_is_bounded() {
        let config = RetryConfig::new("upload")
            .with_base_delay(Duration::from_millis(1))
            .with_max_retries(2);
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_async(
            &config,
            |_| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
