//! Per-connection message rate limiting

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Max client messages per second. Clients send an update every step (about
/// 28 per second) plus the occasional fire or ping.
pub const INPUT_RATE_LIMIT: u32 = 60;

/// Input limiter owned by one connection's reader loop
pub struct ConnectionRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    /// Messages refused since the connection opened
    dropped: u64,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        Self::with_rate(INPUT_RATE_LIMIT)
    }

    /// A rate of zero is treated as one message per second
    pub fn with_rate(messages_per_second: u32) -> Self {
        let rate = NonZeroU32::new(messages_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            dropped: 0,
        }
    }

    /// Admit one input message, counting it if refused
    pub fn check_input(&mut self) -> bool {
        let allowed = self.limiter.check().is_ok();
        if !allowed {
            self.dropped += 1;
        }
        allowed
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
