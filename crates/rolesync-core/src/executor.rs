//! Rate-limited operation executor.
//!
//! Every remote mutation goes through [`RateLimitedExecutor::execute`]. Only
//! `Throttled` failures are retried, with exponential backoff; anything else
//! is returned on the first attempt.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::adapter::NodeResult;
use rolesync_types::models::EngineConfig;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitedExecutor {
    max_retries: u32,
    initial_delay: Duration,
}

impl RateLimitedExecutor {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self { max_retries, initial_delay }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_retries, config.initial_retry_delay())
    }

    /// Backoff before retry number `retry` (1-based).
    fn backoff(&self, retry: u32) -> Duration {
        self.initial_delay.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }

    /// Runs `op`, retrying throttled failures up to `max_retries` times.
    ///
    /// A retry-after hint longer than the current backoff step replaces it.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> NodeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = NodeResult<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_throttled() && retry < self.max_retries => {
                    retry += 1;
                    let step = self.backoff(retry);
                    let wait = e.retry_after().map_or(step, |hint| hint.max(step));
                    warn!(
                        "[Executor] {} throttled, retry {}/{} in {}ms",
                        label,
                        retry,
                        self.max_retries,
                        wait.as_millis()
                    );
                    sleep(wait).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RateLimitedExecutor {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
