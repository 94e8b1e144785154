/// Per-identifier attempt throttling
///
/// Bounds brute-force attempts on the password, OTP, and reset flows:
/// a keyed quota per identifier per minute, applied by the
/// orchestrator at flow entry. This is policy around the cryptographic
/// primitives, not part of them.
use crate::error::{GateError, GateResult};
use governor::{
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Attempt limiter configuration
#[derive(Debug, Clone)]
pub struct AttemptLimitConfig {
    pub enabled: bool,
    /// Verification attempts allowed per identifier per minute
    pub attempts_per_minute: u32,
    pub burst: u32,
}

impl Default for AttemptLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts_per_minute: 5,
            burst: 5,
        }
    }
}

/// Keyed rate limiter over identifiers (usernames, emails, phones)
#[derive(Clone)]
pub struct AttemptLimiter {
    enabled: bool,
    limiter: Arc<GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>,
}

impl AttemptLimiter {
    pub fn new(config: AttemptLimitConfig) -> Self {
        // A zero quota would mean a limiter that admits nothing; clamp to 1
        let per_minute = NonZeroU32::new(config.attempts_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_minute);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        Self {
            enabled: config.enabled,
            limiter: Arc::new(GovernorLimiter::keyed(quota)),
        }
    }

    /// Record an attempt for an identifier; rejects once the quota for
    /// that identifier is spent.
    pub fn check(&self, identifier: &str) -> GateResult<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.limiter.check_key(&identifier.to_string()) {
            Ok(_) => Ok(()),
            Err(_) => {
                tracing::warn!(identifier, "attempt quota exceeded");
                Err(GateError::RateLimited)
            }
        }
    }
}
