/*!
 * Bounded, priority-ordered work pool.
 *
 * At most `max_concurrent` units run at the same time. Queued units are
 * dispatched highest priority first (ties in submission order), each one after
 * a fixed dispatch delay. A settling unit immediately frees its slot for the
 * next one, so throughput is bounded only by the ceiling and the delay.
 */

use log::{debug, error};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

use crate::errors::PoolError;

use super::concurrency::ConcurrencyConfig;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Snapshot of the pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Units dispatched and not yet settled
    pub running: usize,
    /// Units waiting for a slot
    pub queued: usize,
}

impl PoolStatus {
    /// Whether nothing is running or queued
    pub fn is_idle(&self) -> bool {
        self.running == 0 && self.queued == 0
    }
}

/// A unit waiting in the queue
struct QueuedJob {
    priority: i64,
    sequence: u64,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    // Max-heap: higher priority first, then earlier submission
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct PoolState {
    queue: BinaryHeap<QueuedJob>,
    running: usize,
    next_sequence: u64,
    max_concurrent: usize,
    dispatch_delay: Duration,
}

struct PoolInner {
    state: Mutex<PoolState>,
    idle: Notify,
}

/// Bounded work pool, cheap to clone (clones share the queue)
#[derive(Clone)]
pub struct WorkPool {
    inner: Arc<PoolInner>,
}

impl WorkPool {
    /// Create a pool with the given ceiling and pre-dispatch delay
    pub fn new(max_concurrent: usize, dispatch_delay: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    queue: BinaryHeap::new(),
                    running: 0,
                    next_sequence: 0,
                    max_concurrent: max_concurrent.max(1),
                    dispatch_delay,
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Create a pool from a concurrency config
    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self::new(
            config.max_concurrent,
            Duration::from_millis(config.rate_limit_interval_ms),
        )
    }

    /// Replace the ceiling and dispatch delay for subsequent dispatches
    ///
    /// Running units are not touched. A raised ceiling dispatches queued work
    /// right away.
    pub fn apply_config(&self, config: &ConcurrencyConfig) {
        {
            let mut state = self.inner.state.lock();
            state.max_concurrent = config.max_concurrent.max(1);
            state.dispatch_delay = Duration::from_millis(config.rate_limit_interval_ms);
        }
        PoolInner::pump(&self.inner);
    }

    /// Submit one unit with the given priority
    ///
    /// The unit is queued immediately; the returned future resolves with the
    /// unit's output once it settles, or `PoolError::Cancelled` if its task
    /// died first.
    pub fn submit<F, T>(&self, operation: F, priority: i64) -> impl Future<Output = Result<T, PoolError>> + use<F, T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let output = operation.await;
            // The caller may have stopped listening; the unit still ran to completion
            let _ = sender.send(output);
        });

        {
            let mut state = self.inner.state.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.queue.push(QueuedJob { priority, sequence, job });
        }
        PoolInner::pump(&self.inner);

        async move { receiver.await.map_err(|_| PoolError::Cancelled) }
    }

    /// Submit several units; earlier entries get higher priority
    pub async fn submit_all<F, T>(&self, operations: Vec<F>) -> Vec<Result<T, PoolError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let count = operations.len() as i64;
        let pending: Vec<_> = operations
            .into_iter()
            .enumerate()
            .map(|(index, operation)| self.submit(operation, count - index as i64))
            .collect();

        futures::future::join_all(pending).await
    }

    /// Get the current occupancy
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            running: state.running,
            queued: state.queue.len(),
        }
    }

    /// Current ceiling
    pub fn max_concurrent(&self) -> usize {
        self.inner.state.lock().max_concurrent
    }

    /// Wait until nothing is running or queued
    pub async fn wait_for_all(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.status().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl PoolInner {
    /// Dispatch queued units while slots are free
    fn pump(inner: &Arc<PoolInner>) {
        loop {
            let (job, delay) = {
                let mut state = inner.state.lock();
                if state.running >= state.max_concurrent {
                    return;
                }
                let Some(queued) = state.queue.pop() else {
                    return;
                };
                state.running += 1;
                debug!(
                    "Dispatching unit #{} (priority {}), {} running, {} queued",
                    queued.sequence,
                    queued.priority,
                    state.running,
                    state.queue.len()
                );
                (queued.job, state.dispatch_delay)
            };

            let guard = RunningGuard { inner: inner.clone() };
            tokio::spawn(async move {
                let _guard = guard;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                job.await;
            });
        }
    }
}

/// Releases a running slot when the unit settles, including by panic
struct RunningGuard {
    inner: Arc<PoolInner>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Work unit panicked before settling");
        }

        let idle = {
            let mut state = self.inner.state.lock();
            state.running = state.running.saturating_sub(1);
            state.running == 0 && state.queue.is_empty()
        };

        if idle {
            self.inner.idle.notify_waiters();
        } else {
            PoolInner::pump(&self.inner);
        }
    }
}
