/*!
 * Tests for the bounded work pool
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use lingoflow::translation::WorkPool;

#[tokio::test(start_paused = true)]
async fn test_pool_underLoad_shouldNeverExceedCeiling() {
    let pool = WorkPool::new(3, Duration::ZERO);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let operations: Vec<_> = (0..20)
        .map(|_| {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .collect();

    let results = pool.submit_all(operations).await;
    assert_eq!(results.len(), 20);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_pool_withDispatchDelay_shouldSpaceSerialUnits() {
    let pool = WorkPool::new(1, Duration::from_millis(100));
    let start = Instant::now();

    let results = pool.submit_all((0..3).map(|i| async move { i }).collect()).await;

    let values: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec![0, 1, 2]);
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_pool_clones_shouldShareQueueAndCeiling() {
    let pool = WorkPool::new(1, Duration::ZERO);
    let other = pool.clone();
    let (release, blocked) = tokio::sync::oneshot::channel::<()>();

    let first = pool.submit(async move { let _ = blocked.await; }, 0);
    let second = other.submit(async { 42 }, 0);
    assert_eq!(pool.status().queued, 1);
    assert_eq!(other.max_concurrent(), 1);

    release.send(()).unwrap();
    first.await.unwrap();
    assert_eq!(second.await.unwrap(), 42);
}
