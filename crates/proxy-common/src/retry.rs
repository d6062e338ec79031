//! Retry execution with exponential backoff and jitter. The forwarding
//! executor wraps each backend dispatch in one of these before escalating
//! to the next backend on the path, so a single transient failure doesn't
//! burn an escalation step it didn't need to.

use crate::error::Error;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt (1-indexed). Jitter is uniform in
    /// [0.9, 1.1] of the computed exponential delay so that concurrent
    /// retries against the same backend don't all wake up in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let base_ms = (self.base_delay.as_millis() as f64) * exp;
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        let jittered_ms = if self.use_jitter {
            let factor = rand::thread_rng().gen_range(0.9..=1.1);
            capped_ms * factor
        } else {
            capped_ms
        };
        Duration::from_millis(jittered_ms.round() as u64)
    }
}

/// Runs an async operation, retrying recoverable errors (`Error::is_retryable`)
/// up to `config.max_attempts` times with backoff between attempts.
pub struct RetryExecutor {
    config: RetryConfig,
    operation_name: String,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig, operation_name: impl Into<String>) -> Self {
        Self {
            config,
            operation_name: operation_name.into(),
        }
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.config.max_attempts && err.is_retryable() => {
                    let delay = self.config.delay_for_attempt(attempt);
                    debug!(
                        operation = %self.operation_name,
                        attempt,
                        ?delay,
                        error = %err,
                        "retrying after recoverable error"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
