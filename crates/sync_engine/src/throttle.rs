//! Pacing between consecutive fetches against the source.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::time::Duration;

pub const DEFAULT_DELAY: Duration = Duration::from_secs(4);

#[async_trait]
pub trait Throttle: Send + Sync {
    /// Called after every fetch inside a loop.
    async fn pace(&self);
}

/// Sleeps a fixed delay on every call. No backoff, no jitter.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn pace(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// GCRA limiter allowing one call per `period`; waits only when calls come faster.
pub struct QuotaThrottle {
    limiter: DefaultDirectRateLimiter,
}

impl QuotaThrottle {
    /// `None` for a zero period.
    pub fn new(period: Duration) -> Option<Self> {
        let quota = Quota::with_period(period)?;
        Some(Self { limiter: RateLimiter::direct(quota) })
    }
}

#[async_trait]
impl Throttle for QuotaThrottle {
    async fn pace(&self) {
        self.limiter.until_ready().await;
    }
}
