//! Distributed fixed-window rate limiter
//!
//! A per-user counter in the shared store, reset every window. Approximate
//! by design: a user can land up to 2x the budget across a window boundary,
//! which is accepted in exchange for a single atomic increment per message.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::RATE_LIMIT_KEY_PREFIX;
use crate::storage::traits::RateLimitStore;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Seconds until the current window ends; zero when allowed.
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    fn rejected(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after_secs: retry_after.as_secs().max(1),
        }
    }
}

/// Per-user message budget enforced across all nodes.
///
/// Store failures and timeouts fail OPEN: the message is allowed through.
/// This is the inverse of the session path, which fails closed — rate
/// limiting protects capacity, it is not a correctness guarantee.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_messages: u64,
    window: Duration,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        max_messages: u64,
        window: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            max_messages,
            window,
            timeout,
        }
    }

    /// Count this request against the user's window and decide.
    pub async fn check_and_consume(&self, user_id: &str) -> RateLimitDecision {
        let key = format!("{}{}", RATE_LIMIT_KEY_PREFIX, user_id);

        match tokio::time::timeout(self.timeout, self.store.increment(&key, self.window)).await {
            Ok(Ok((count, remaining))) => {
                if count > self.max_messages {
                    RateLimitDecision::rejected(remaining)
                } else {
                    RateLimitDecision::allowed()
                }
            }
            Ok(Err(e)) => {
                log::warn!(
                    "rate limit store degraded, failing open: user={}, error={}",
                    user_id,
                    e
                );
                RateLimitDecision::allowed()
            }
            Err(_) => {
                log::warn!(
                    "rate limit store timed out after {:?}, failing open: user={}",
                    self.timeout,
                    user_id
                );
                RateLimitDecision::allowed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChatPipeError, Result};
    use crate::storage::memory::MemoryRateLimitStore;
    use crate::storage::traits::RateLimitStore;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn increment(&self, _key: &str, _window: Duration) -> Result<(u64, Duration)> {
            Err(ChatPipeError::StorageError("store down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(
            Arc::new(BrokenStore),
            1,
            Duration::from_secs(60),
            Duration::from_millis(100),
        );

        // Far beyond the budget, but the store is down: everything passes.
        for _ in 0..5 {
            assert!(limiter.check_and_consume("u1").await.allowed);
        }
    }

    #[tokio::test]
    async fn test_budget_enforced_per_user() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            2,
            Duration::from_secs(60),
            Duration::from_millis(100),
        );

        assert!(limiter.check_and_consume("u1").await.allowed);
        assert!(limiter.check_and_consume("u1").await.allowed);

        let rejected = limiter.check_and_consume("u1").await;
        assert!(!rejected.allowed);
        assert!(rejected.retry_after_secs >= 1);

        // A different user has an untouched budget.
        assert!(limiter.check_and_consume("u2").await.allowed);
    }
}
