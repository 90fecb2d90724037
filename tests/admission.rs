use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use trust_cache::resilience::rate_limiter::{AdmissionController, RateLimitRule};

#[test]
fn test_fixed_window_reset() {
    let limiter = AdmissionController::new();
    let window = Duration::from_millis(60_000);
    let start = Utc::now();

    for i in 0..20u32 {
        let decision = limiter.check_at("198.51.100.4", 20, window, start + ChronoDuration::seconds(i as i64));
        assert!(decision.allowed, "call {} should pass", i + 1);
        assert_eq!(decision.remaining, 19 - i);
        assert_eq!(decision.limit, 20);
    }

    let rejected = limiter.check_at("198.51.100.4", 20, window, start + ChronoDuration::seconds(30));
    assert!(!rejected.allowed);
    assert_eq!(rejected.remaining, 0);
    assert_eq!(rejected.retry_after_secs, Some(30));

    let after_reset = rejected.reset_at + ChronoDuration::milliseconds(1);
    let reopened = limiter.check_at("198.51.100.4", 20, window, after_reset);
    assert!(reopened.allowed);
    assert_eq!(reopened.remaining, 19);
    assert_eq!(reopened.reset_at, after_reset + ChronoDuration::seconds(60));
}

#[test]
fn test_boundary_burst_is_allowed() {
    // Fixed windows let a full budget through on each side of the boundary.
    let limiter = AdmissionController::new();
    let rule = RateLimitRule::new(3, Duration::from_secs(10));
    let start = Utc::now();
    let edge = start + ChronoDuration::seconds(10);

    let mut allowed = 0;
    for _ in 0..3 {
        allowed += limiter.check_at("ip", rule.max_requests, rule.window, edge).allowed as u32;
    }
    let next = edge + ChronoDuration::milliseconds(1);
    for _ in 0..3 {
        allowed += limiter.check_at("ip", rule.max_requests, rule.window, next + ChronoDuration::seconds(10)).allowed as u32;
    }
    assert_eq!(allowed, 6);
}

#[tokio::test]
async fn test_background_sweep_bounds_table() {
    let limiter = Arc::new(AdmissionController::new());
    limiter.check("short-lived", 5, Duration::from_millis(10));
    limiter.check("long-lived", 5, Duration::from_secs(600));
    assert_eq!(limiter.tracked(), 2);

    let handle = limiter.spawn_sweeper(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(limiter.tracked(), 1);
    assert!(limiter.window("long-lived").is_some());
    handle.abort();
}
