use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Per-identifier limiter for the chat route: `requests` per `period_seconds`,
/// refilled evenly, with the whole allowance usable as a burst.
pub struct ChatRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl ChatRateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        let burst = NonZeroU32::new(cfg.requests).unwrap_or(NonZeroU32::MIN);
        let replenish = Duration::from_secs(cfg.period_seconds.max(1)) / burst.get();
        let quota = Quota::with_period(replenish)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Returns true when the request may proceed.
    pub fn check(&self, identifier: &str) -> bool {
        let allowed = self.limiter.check_key(&identifier.to_string()).is_ok();
        if !allowed {
            debug!("Rate limit exceeded for {}", identifier);
        }
        allowed
    }

    /// Drops state for identifiers whose allowance has fully refilled.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_after_burst() {
        let limiter = ChatRateLimiter::new(&RateLimitConfig {
            requests: 2,
            period_seconds: 60,
        });
        assert!(limiter.check("/api/chat/c1-u1"));
        assert!(limiter.check("/api/chat/c1-u1"));
        assert!(!limiter.check("/api/chat/c1-u1"));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = ChatRateLimiter::new(&RateLimitConfig {
            requests: 1,
            period_seconds: 60,
        });
        assert!(limiter.check("/api/chat/c1-u1"));
        assert!(!limiter.check("/api/chat/c1-u1"));
        assert!(limiter.check("/api/chat/c1-u2"));
    }
}
