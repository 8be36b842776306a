//! Retry logic.
//!
//! # Responsibilities
//! - Execute an async operation until it succeeds or attempts run out
//! - Sleep with exponential backoff + jitter between attempts
//!
//! # Design Decisions
//! - `max_attempts` counts the first call, so 5 means at most 5 calls
//! - Exhaustion is returned to the caller once; alerting is the caller's job
//! - Jittered backoff prevents thundering herd

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Bounds of one retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

/// Every attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds, at most `policy.max_attempts` times.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(operation, attempt, delay = ?delay, error = %e, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::warn!(operation, attempt, error = %e, "Attempt failed, retries exhausted");
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
        }
    }
}
