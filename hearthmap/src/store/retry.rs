//! Bounded retry for datastore contention.
//!
//! The embedded store locks the whole file during writes, so transient
//! contention is normal under parallel tile uploads. Contended writes
//! retry with exponential backoff plus jitter; any other error, and
//! exhaustion of the budget, propagate to the caller.

use super::error::StoreError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy for contended datastore writes.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 5)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub base_delay: Duration,
    /// Ceiling on any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based), jittered by up to
    /// half the nominal delay so contending writers spread out.
    fn delay_for(&self, retry: u32) -> Duration {
        let nominal = self
            .base_delay
            .saturating_mul(1u32 << (retry - 1).min(16))
            .min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=nominal.as_millis().max(1) as u64 / 2);
        nominal + Duration::from_millis(jitter_ms)
    }
}

/// Runs `attempt` until it succeeds, fails with a non-contention error,
/// or the retry budget is exhausted.
///
/// The closure is invoked fresh on every attempt, so any speculative
/// in-memory transaction state it built must live inside the closure
/// and is discarded before each retry.
pub async fn with_retry<T, F, Fut>(
    op: &str,
    config: &RetryConfig,
    mut attempt: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max = config.max_attempts.max(1);
    for n in 1..=max {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(StoreError::Contention { .. }) if n < max => {
                let delay = config.delay_for(n);
                debug!(op, attempt = n, delay_ms = delay.as_millis() as u64, "datastore contended, backing off");
                sleep(delay).await;
            }
            Err(StoreError::Contention { .. }) => {
                warn!(op, attempts = max, "datastore contention budget exhausted");
                return Err(StoreError::ContentionExhausted {
                    op: op.to_string(),
                    attempts: max,
                });
            }
            Err(other) => return Err(other),
        }
    }
    unreachable!("retry loop returns within max attempts")
}
