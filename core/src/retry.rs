use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff policy applied to cache and store calls.
///
/// A failed attempt is retried up to `max_retries` more times. The n-th retry
/// (0-based) waits `base_delay * multiplier^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2,
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(self.multiplier.saturating_pow(retry))
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds or the retry budget is spent, returning the
    /// last error in the latter case. Waits with `tokio::time::sleep`.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    retry += 1;
                    tracing::debug!(
                        operation,
                        attempt = retry,
                        max_retries = self.max_retries,
                        ?delay,
                        error = %err,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
