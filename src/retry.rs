//! Exponential backoff retry helper.
//!
//! General-purpose: the binary uses it to establish the rate store connection
//! at startup. The rate limiter's per-request path never retries; a failed
//! store call there fails open instead.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};

/// Jitter percentage applied to each backoff delay (±20%).
const BACKOFF_JITTER_PERCENT: f64 = 0.2;

/// Floor for any computed delay, in milliseconds.
const MIN_RETRY_DELAY_MS: u64 = 100;

/// Bounds for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Cap on the delay between attempts
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Un-jittered delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }

    /// Delay after the given failed attempt with jitter applied.
    fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay_ms = self.delay_for(attempt).as_millis() as f64;
        let jitter = delay_ms * BACKOFF_JITTER_PERCENT * (rand_jitter() * 2.0 - 1.0);
        let final_ms = (delay_ms + jitter).max(MIN_RETRY_DELAY_MS as f64);
        Duration::from_millis(final_ms as u64)
    }
}

/// Generate a random jitter value in `[0.0, 1.0)`.
fn rand_jitter() -> f64 {
    rand::rng().random::<f64>()
}

/// Run `op` until it succeeds or the policy's attempts are exhausted.
///
/// Returns the last error when every attempt fails.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= policy.max_attempts => {
                warn!(
                    operation,
                    attempts = attempt,
                    error = %e,
                    "Operation failed, giving up"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.jittered_delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
