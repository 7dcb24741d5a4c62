use crate::error::{ProviderError, ProviderResult};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Final outcome of a retried call plus the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: ProviderResult<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        let ms = self.initial_backoff.as_millis() as f64 * factor;
        let max_ms = self.max_backoff.as_millis() as f64;
        Duration::from_millis(ms.min(max_ms) as u64)
    }

    /// Runs `call` under a per-attempt `timeout`, retrying retryable failures.
    pub async fn run<F, Fut, T>(&self, operation: &str, timeout: Duration, mut call: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(timeout, call()).await {
                Ok(res) => res,
                Err(_) => Err(ProviderError::timeout(format!(
                    "{operation} exceeded {}ms",
                    timeout.as_millis()
                ))),
            };

            match result {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::debug!(operation, attempts, "call succeeded after retry");
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(err) => {
                    let retries_used = attempts - 1;
                    if !err.kind.is_retryable() || retries_used >= self.max_retries {
                        return Attempted {
                            result: Err(err),
                            attempts,
                        };
                    }
                    let backoff = self.backoff(attempts);
                    tracing::warn!(operation, attempt = attempts, ?backoff, error = %err, "provider call failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
