//! Rate limiting for store requests.
//!
//! Airtable allows about five requests per second per base and answers
//! HTTP 429 beyond that. Two pieces keep a run inside the limit:
//!
//! - [`WritePacer`] spaces consecutive writes by a minimum interval
//! - [`retry_rate_limited`] retries a request answered with 429, with
//!   exponential backoff
//!
//! # Backoff Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay)
//! ```
//!
//! Any other error is returned immediately.

use super::StoreError;
use std::cell::Cell;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{error, warn};

const TOO_MANY_REQUESTS: u16 = 429;

/// How often, and how patiently, a rate-limited request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry (doubles with each attempt).
    pub base_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op`, retrying while the store answers 429.
pub async fn retry_rate_limited<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(StoreError::Status { status, body }) if status == TOO_MANY_REQUESTS => {
                attempt += 1;
                if attempt > policy.max_retries {
                    error!(attempts = attempt, "Rate limit persisted; giving up");
                    return Err(StoreError::Status { status, body });
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited by record store; retrying"
                );
                sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Enforces a minimum interval between writes.
#[derive(Debug, Clone)]
pub struct WritePacer {
    interval: Duration,
    last: Cell<Option<Instant>>,
}

impl WritePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Cell::new(None),
        }
    }

    /// Wait until `interval` has passed since the previous call.
    pub async fn wait(&self) {
        if let Some(last) = self.last.get() {
            sleep_until(last + self.interval).await;
        }
        self.last.set(Some(Instant::now()));
    }
}
