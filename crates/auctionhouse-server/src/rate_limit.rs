//! Per-process, per-user chat rate limiting.
//!
//! Counters are an approximation that need not be exact across worker
//! processes (§5): each process enforces its own window independently, and
//! the bucket is rebuilt empty on restart.

use std::{
    num::NonZeroU32,
    sync::Arc,
};

use governor::{
    clock::{
        Clock,
        DefaultClock,
    },
    state::keyed::DefaultKeyedStateStore,
    Quota,
    RateLimiter,
};

use crate::{
    error::DomainError,
    ids::UserId,
};

pub struct ChatRateLimiter {
    inner: RateLimiter<UserId, DefaultKeyedStateStore<UserId>, DefaultClock>,
}

impl ChatRateLimiter {
    /// `max_messages` per `window` per user, e.g. 10 messages per 60s.
    #[must_use]
    pub fn new(max_messages: u32, window: std::time::Duration) -> Self {
        let quota = Quota::with_period(window / max_messages.max(1))
            .expect("window must be positive")
            .allow_burst(NonZeroU32::new(max_messages).expect("max_messages must be nonzero"));
        Self {
            inner: RateLimiter::keyed(quota),
        }
    }

    /// Checks and consumes one unit of quota for `user_id`, returning
    /// `too_many_requests` if the bucket is exhausted.
    pub fn check(&self, user_id: UserId) -> Result<(), DomainError> {
        self.inner.check_key(&user_id).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            DomainError::TooManyRequests {
                retry_after_secs: wait.as_secs().max(1),
            }
        })
    }
}

/// A handle shared across command-surface handlers.
pub type SharedChatRateLimiter = Arc<ChatRateLimiter>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn allows_burst_then_rejects() {
        let limiter = ChatRateLimiter::new(3, Duration::from_secs(60));
        let user = UserId(1);
        assert!(limiter.check(user).is_ok());
        assert!(limiter.check(user).is_ok());
        assert!(limiter.check(user).is_ok());
        assert!(matches!(
            limiter.check(user),
            Err(DomainError::TooManyRequests { .. })
        ));
    }

    #[test]
    fn different_users_have_independent_buckets() {
        let limiter = ChatRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(UserId(1)).is_ok());
        assert!(limiter.check(UserId(2)).is_ok());
        assert!(limiter.check(UserId(1)).is_err());
    }
}
