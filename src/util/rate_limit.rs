//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Intent message rate limit per connection. Pong clients legitimately send
/// a paddle intent per mouse-move event, so the ceiling sits well above the
/// fastest tick rate.
pub const INTENT_RATE_LIMIT: u32 = 120;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct ConnRateLimiter {
    intent_limiter: Arc<Limiter>,
}

impl ConnRateLimiter {
    pub fn new() -> Self {
        Self {
            intent_limiter: create_limiter(INTENT_RATE_LIMIT),
        }
    }

    /// Check if an intent message is allowed (returns true if allowed)
    pub fn check_intent(&self) -> bool {
        self.intent_limiter.check().is_ok()
    }
}

impl Default for ConnRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_burst_within_quota() {
        let limiter = ConnRateLimiter::new();
        assert!(limiter.check_intent());
    }

    #[test]
    fn test_limiter_blocks_past_quota() {
        let limiter = ConnRateLimiter::new();
        let mut allowed = 0;
        for _ in 0..INTENT_RATE_LIMIT * 2 {
            if limiter.check_intent() {
                allowed += 1;
            }
        }
        assert!(allowed <= INTENT_RATE_LIMIT);
        assert!(allowed > 0);
    }
}
