/*!
 * Tests for the sliding-window rate limiter
 */

use std::time::Duration;
use tokio::time::Instant;

use lingoflow::app_config::ServiceKind;
use lingoflow::translation::{RateLimiter, ServiceProfile};

#[tokio::test(start_paused = true)]
async fn test_try_acquire_atCapacity_shouldRefuseUntilWindowPasses() {
    let limiter = RateLimiter::new(2, Duration::from_secs(1));
    assert!(limiter.try_acquire());
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());

    let status = limiter.status();
    assert_eq!(status.current, 2);
    assert_eq!(status.max, 2);
    assert!(status.reset_in_ms <= 1000);

    tokio::time::advance(Duration::from_millis(1001)).await;
    assert!(limiter.try_acquire());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_slot_overQuota_shouldDelayUntilOldestExpires() {
    let limiter = RateLimiter::new(2, Duration::from_secs(1)).with_max_sleep_step(Duration::from_millis(50));
    let start = Instant::now();

    for _ in 0..5 {
        limiter.wait_for_slot().await;
    }

    // Permits 3-4 wait one window, permit 5 waits two
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2200), "took {:?}", elapsed);
}

#[test]
fn test_from_profile_shouldFollowServiceQuota() {
    assert!(RateLimiter::from_profile(&ServiceProfile::for_service(ServiceKind::Ollama)).is_none());

    let limiter = RateLimiter::from_profile(&ServiceProfile::for_service(ServiceKind::OpenAI)).unwrap();
    assert_eq!(limiter.status().max, 60);
}
