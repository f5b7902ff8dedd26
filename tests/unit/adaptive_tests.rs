/*!
 * Tests for the adaptive concurrency manager
 */

use std::sync::Arc;
use std::time::Duration;

use lingoflow::app_config::{AdaptiveTuning, ServiceKind};
use lingoflow::translation::{AdaptiveConcurrencyManager, NetworkCondition, PerformanceSample};

fn sample(response_time_ms: f64, error_rate: f64) -> PerformanceSample {
    PerformanceSample::new(response_time_ms, error_rate, 2.0, 0)
}

/// Twenty samples at a 50% error rate must reach emergency settings within one health-check period
#[tokio::test(start_paused = true)]
async fn test_sustained_failures_shouldSnapToMinimumWithinOneHealthCheck() {
    let tuning = AdaptiveTuning {
        // Keep the sample path out of the picture
        cooldown_ms: 60_000,
        ..AdaptiveTuning::default()
    };
    let manager = Arc::new(AdaptiveConcurrencyManager::new(ServiceKind::Google, tuning));

    // One healthy adjustment starts the cooldown
    for _ in 0..3 {
        manager.record_metrics(sample(100.0, 0.0));
    }
    for _ in 0..20 {
        manager.record_metrics(sample(900.0, 0.5));
    }
    assert_eq!(manager.evaluate_condition(), NetworkCondition::Critical);

    let handle = manager.spawn_health_check();
    let period = manager.current_config().health_check_interval_ms;
    tokio::time::sleep(Duration::from_millis(period + 1)).await;

    let bounds = &manager.profile().bounds;
    let config = manager.current_config();
    assert!(manager.is_emergency());
    assert_eq!(config.max_concurrent, bounds.min_concurrent);
    assert_eq!(config.rate_limit_interval_ms, bounds.max_interval_ms);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_every_service_underMixedSamples_shouldStayWithinBounds() {
    let pattern = [
        (100.0, 0.0),
        (200.0, 0.01),
        (4000.0, 0.0),
        (800.0, 0.2),
        (300.0, 0.5),
        (1200.0, 0.04),
    ];

    for service in ServiceKind::ALL {
        let manager = AdaptiveConcurrencyManager::for_service(service);
        let bounds = manager.profile().bounds.clone();

        for round in 0..60 {
            let (response, error) = pattern[(round / 4) % pattern.len()];
            manager.record_metrics(sample(response, error));
            manager.health_check();
            assert!(bounds.contains(&manager.current_config()), "{} left its bounds", service);
            tokio::time::advance(Duration::from_millis(1_500)).await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_good_but_slow_samples_shouldHoldConcurrency() {
    let manager = AdaptiveConcurrencyManager::for_service(ServiceKind::OpenAI);
    let base = manager.current_config();

    for _ in 0..10 {
        manager.record_metrics(sample(1000.0, 0.03));
        tokio::time::advance(Duration::from_millis(5_001)).await;
    }

    assert_eq!(manager.evaluate_condition(), NetworkCondition::Good);
    assert_eq!(manager.current_config(), base);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_afterEmergency_shouldLeaveEmergencyMode() {
    let manager = AdaptiveConcurrencyManager::for_service(ServiceKind::Anthropic);
    for _ in 0..10 {
        manager.record_metrics(sample(500.0, 0.8));
    }
    assert!(manager.is_emergency());

    tokio::time::advance(Duration::from_millis(5_001)).await;
    for _ in 0..10 {
        manager.record_metrics(sample(100.0, 0.0));
    }
    assert!(!manager.is_emergency());
    assert!(manager.current_config().max_concurrent > manager.profile().bounds.min_concurrent);
}

#[test]
fn test_performance_sample_new_shouldDeriveSuccessRate() {
    let sample = PerformanceSample::new(250.0, 0.25, 4.0, 3);
    assert_eq!(sample.success_rate, 0.75);
    assert_eq!(sample.queue_depth, 3);
    assert!(sample.timestamp > 0);
}
