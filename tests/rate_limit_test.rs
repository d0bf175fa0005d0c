use std::sync::Arc;
use std::time::Duration;

use chatpipe::core::rate_limiter::RateLimiter;
use chatpipe::storage::memory::MemoryRateLimitStore;

fn limiter(max: u64, window: Duration) -> RateLimiter {
    RateLimiter::new(
        Arc::new(MemoryRateLimitStore::new()),
        max,
        window,
        Duration::from_millis(200),
    )
}

#[tokio::test]
async fn test_exactly_limit_requests_succeed() {
    let limiter = limiter(5, Duration::from_secs(60));

    for i in 0..5 {
        let decision = limiter.check_and_consume("u1").await;
        assert!(decision.allowed, "request {} should be allowed", i + 1);
        assert_eq!(decision.retry_after_secs, 0);
    }

    let rejected = limiter.check_and_consume("u1").await;
    assert!(!rejected.allowed);
    assert!(rejected.retry_after_secs > 0);
}

#[tokio::test]
async fn test_new_window_resets_budget() {
    let window = Duration::from_millis(100);
    let limiter = limiter(1, window);

    assert!(limiter.check_and_consume("u1").await.allowed);
    assert!(!limiter.check_and_consume("u1").await.allowed);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(limiter.check_and_consume("u1").await.allowed);
}

#[tokio::test]
async fn test_users_have_independent_windows() {
    let limiter = limiter(1, Duration::from_secs(60));

    assert!(limiter.check_and_consume("u1").await.allowed);
    assert!(!limiter.check_and_consume("u1").await.allowed);
    assert!(limiter.check_and_consume("u2").await.allowed);
}

#[tokio::test]
async fn test_concurrent_consumption_never_exceeds_double_budget() {
    // The fixed window is approximate across a boundary but counts must
    // stay exact within one window even under concurrency.
    let limiter = Arc::new(limiter(10, Duration::from_secs(60)));

    let mut handles = Vec::new();
    for _ in 0..25 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.check_and_consume("u1").await.allowed
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}
