//! Exponential backoff retry with per-attempt timeouts.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Configuration for the retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Initial backoff delay (ms).
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay (ms); caps exponential growth.
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff on each retry.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

/// Stateless retry policy — computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff_ms as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.config.max_backoff_ms as f64);
        Some(Duration::from_millis(capped as u64))
    }

    /// Run `op` until it succeeds, fails non-transiently, or the retry budget
    /// is spent. Each attempt is bounded by `timeout`; an elapsed attempt
    /// counts as a transient [`SyncError::Timeout`].
    ///
    /// Exhausting the budget escalates the last error to [`SyncError::Fatal`].
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        mut op: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(SyncError::Timeout {
                    operation: operation.to_string(),
                    ms: timeout.as_millis() as u64,
                }),
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    match self.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                operation,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Transient failure, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(operation, attempt, error = %e, "Retry budget exhausted");
                            return Err(e.into_fatal(&format!(
                                "{operation} failed after {attempt} attempts"
                            )));
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2.0,
        })
    }

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        });
        assert_eq!(policy.next_delay(1).unwrap().as_millis(), 100);
        assert_eq!(policy.next_delay(2).unwrap().as_millis(), 200);
        assert_eq!(policy.next_delay(3).unwrap().as_millis(), 400);
        assert!(policy.next_delay(4).is_none());
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
            multiplier: 10.0,
        });
        assert_eq!(policy.next_delay(5).unwrap(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn transient_then_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out = fast(3)
            .run("op", Duration::from_secs(1), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SyncError::Transient("flaky".into()))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_fatal() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast(2)
            .run("op", Duration::from_secs(1), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SyncError::Transient("down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Fatal(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast(5)
            .run("op", Duration::from_secs(1), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SyncError::Decode("bad json".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_transient() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = fast(1)
            .run("slow", Duration::from_millis(5), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, SyncError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Fatal(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
