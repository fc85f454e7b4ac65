//! Shared token-bucket throttle for upstream API calls

use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};

/// One permit per `interval`, burst size 1, shared by every upstream call in
/// the process.
pub struct RequestThrottle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RequestThrottle {
    pub fn new(interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_millis(25)
        } else {
            interval
        };
        // with_period is only None for a zero duration, which is handled above
        let quota = Quota::with_period(interval).expect("non-zero throttle interval");

        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Suspends the calling task until a slot is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}
