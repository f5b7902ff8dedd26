/*!
 * Batch translation processing.
 *
 * This module turns a list of keyed texts into per-key outcomes. Texts shared
 * by several keys are translated once, cached translations are reused, and
 * the remaining texts are dispatched in priority order through the work pool
 * while the adaptive manager tunes concurrency from the observed timings.
 */

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::app_config::{BatchingConfig, Config, ServiceKind};
use crate::errors::{PoolError, TranslationError};

use super::adaptive::{AdaptiveConcurrencyManager, PerformanceSample};
use super::cache::TranslationCache;
use super::dedup::{BatchEntry, TextUnit, chunk, deduplicate, prioritize};
use super::pool::WorkPool;
use super::rate_limiter::RateLimiter;

/// Translates a single text
///
/// Implementations wrap a vendor client; the orchestrator never looks past
/// this call.
#[async_trait]
pub trait Translate: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslationError>;
}

/// Adapter turning an async closure into a `Translate`
pub struct FnTranslator<F> {
    func: F,
}

impl<F> FnTranslator<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Translate for FnTranslator<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, TranslationError>> + Send,
{
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        (self.func)(text.to_string()).await
    }
}

/// Counters describing one `translate_batch` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    /// Distinct keys in the input
    pub total_keys: usize,
    /// Distinct source texts
    pub unique_texts: usize,
    /// Texts answered from the cache
    pub cache_hits: usize,
    /// Texts translated successfully by the service
    pub translated: usize,
    /// Texts whose translation failed
    pub failed: usize,
    /// Keys that received an error
    pub failed_keys: usize,
    pub duration: Duration,
}

/// Result of a batch: one outcome per key
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: HashMap<String, Result<String, TranslationError>>,
    /// True when fewer than half of the keys failed
    pub success: bool,
    pub stats: BatchStats,
}

impl BatchOutcome {
    fn empty() -> Self {
        Self {
            results: HashMap::new(),
            success: true,
            stats: BatchStats::default(),
        }
    }

    /// Outcome for one key
    pub fn get(&self, key: &str) -> Option<&Result<String, TranslationError>> {
        self.results.get(key)
    }

    /// Successful translations by key
    pub fn translations(&self) -> HashMap<String, String> {
        self.results
            .iter()
            .filter_map(|(key, result)| result.as_ref().ok().map(|t| (key.clone(), t.clone())))
            .collect()
    }

    /// Failed keys with their errors, sorted by key
    pub fn failures(&self) -> Vec<(&str, &TranslationError)> {
        let mut failures: Vec<_> = self
            .results
            .iter()
            .filter_map(|(key, result)| result.as_ref().err().map(|e| (key.as_str(), e)))
            .collect();
        failures.sort_by(|a, b| a.0.cmp(b.0));
        failures
    }
}

/// Progress sink receiving a percentage in [0, 100]
pub type ProgressCallback<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Running counters of the units dispatched in one batch
struct DispatchCounters {
    started: Instant,
    completed: usize,
    failed: usize,
}

impl DispatchCounters {
    fn sample(&mut self, response_time: Duration, failed: bool, queue_depth: usize) -> PerformanceSample {
        self.completed += 1;
        if failed {
            self.failed += 1;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            self.completed as f64 / elapsed
        } else {
            self.completed as f64
        };

        PerformanceSample::new(
            response_time.as_secs_f64() * 1000.0,
            self.failed as f64 / self.completed as f64,
            throughput,
            queue_depth,
        )
    }
}

/// Batch translator for one service and language pair
pub struct BatchTranslator {
    service: ServiceKind,
    source_language: String,
    target_language: String,
    cache: TranslationCache,
    manager: Arc<AdaptiveConcurrencyManager>,
    pool: WorkPool,
    rate_limiter: Option<Arc<RateLimiter>>,
    batching: BatchingConfig,
    health_check: Mutex<Option<JoinHandle<()>>>,
}

impl BatchTranslator {
    /// Create a new batch translator
    ///
    /// The pool starts from the manager's current configuration and the
    /// vendor quota, if any, comes from the service profile.
    pub fn new(
        service: ServiceKind,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        cache: TranslationCache,
        manager: Arc<AdaptiveConcurrencyManager>,
        batching: BatchingConfig,
    ) -> Self {
        let pool = WorkPool::from_config(&manager.current_config());
        let rate_limiter = RateLimiter::from_profile(manager.profile()).map(Arc::new);

        Self {
            service,
            source_language: source_language.into(),
            target_language: target_language.into(),
            cache,
            manager,
            pool,
            rate_limiter,
            batching,
            health_check: Mutex::new(None),
        }
    }

    /// Create a batch translator from the application configuration
    pub fn from_config(config: &Config, cache: TranslationCache) -> Self {
        let manager = Arc::new(AdaptiveConcurrencyManager::new(
            config.service,
            config.adaptive.clone(),
        ));
        Self::new(
            config.service,
            config.source_language.clone(),
            config.target_language.clone(),
            cache,
            manager,
            config.batching.clone(),
        )
    }

    /// Replace the vendor quota limiter
    pub fn with_rate_limiter(mut self, rate_limiter: Option<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter.map(Arc::new);
        self
    }

    /// Start the manager's periodic health check for the lifetime of this translator
    pub fn spawn_health_check(&self) {
        let mut handle = self.health_check.lock();
        if handle.is_none() {
            *handle = Some(self.manager.spawn_health_check());
        }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn manager(&self) -> &Arc<AdaptiveConcurrencyManager> {
        &self.manager
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// Translate a batch of keyed texts
    ///
    /// Every distinct key in `entries` gets exactly one outcome. A failing text
    /// only fails the keys sharing it; the call itself never fails.
    pub async fn translate_batch(
        &self,
        entries: &[BatchEntry],
        translator: Arc<dyn Translate>,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> BatchOutcome {
        if entries.is_empty() {
            return BatchOutcome::empty();
        }

        let batch_id = Uuid::new_v4();
        let started = Instant::now();
        let units = deduplicate(entries);

        let mut stats = BatchStats {
            total_keys: units.iter().map(TextUnit::usage_count).sum(),
            unique_texts: units.len(),
            ..BatchStats::default()
        };
        let mut results = HashMap::with_capacity(stats.total_keys);
        let mut settled = 0usize;

        info!(
            "Batch {}: {} keys, {} unique texts ({} -> {}, {})",
            batch_id,
            stats.total_keys,
            stats.unique_texts,
            self.source_language,
            self.target_language,
            self.service
        );

        let mut pending = Vec::with_capacity(units.len());
        for unit in units {
            match self.cache.get(
                &unit.text,
                &self.source_language,
                &self.target_language,
                self.service,
            ) {
                Some(translation) => {
                    stats.cache_hits += 1;
                    settled += 1;
                    fan_out(&mut results, &unit.keys, Ok(translation));
                }
                None => pending.push(unit),
            }
        }
        if stats.cache_hits > 0 {
            debug!("Batch {}: {} texts served from cache", batch_id, stats.cache_hits);
            report_progress(on_progress, settled, stats.unique_texts);
        }

        let ordered = prioritize(pending, &self.batching.priority);
        let batches = chunk(
            ordered,
            self.manager.current_config().max_concurrent,
            &self.batching.chunking,
        );

        let mut counters = DispatchCounters {
            started,
            completed: 0,
            failed: 0,
        };

        for (index, batch) in batches.into_iter().enumerate() {
            let config = self.manager.current_config();
            self.pool.apply_config(&config);
            debug!(
                "Batch {}: dispatching chunk {} with {} texts (concurrency {}, interval {}ms)",
                batch_id,
                index + 1,
                batch.len(),
                config.max_concurrent,
                config.rate_limit_interval_ms
            );

            let mut in_flight = FuturesUnordered::new();
            for unit in batch {
                let job = unit_job(self.rate_limiter.clone(), unit.text.clone(), translator.clone());
                let handle = self.pool.submit(job, unit.priority);
                in_flight.push(async move { (unit, handle.await) });
            }

            while let Some((unit, outcome)) = in_flight.next().await {
                let (result, response_time) = match outcome {
                    Ok(settled_unit) => settled_unit,
                    Err(PoolError::Cancelled) => (
                        Err(TranslationError::NetworkFailure(
                            "translation task ended before settling".to_string(),
                        )),
                        Duration::ZERO,
                    ),
                };

                let sample = counters.sample(response_time, result.is_err(), self.pool.status().queued);
                self.manager.record_metrics(sample);

                match &result {
                    Ok(translation) => {
                        stats.translated += 1;
                        self.cache.set(
                            &unit.text,
                            &self.source_language,
                            &self.target_language,
                            self.service,
                            translation,
                        );
                    }
                    Err(e) => {
                        stats.failed += 1;
                        stats.failed_keys += unit.usage_count();
                        warn!(
                            "Batch {}: translation failed for {} key(s): {}",
                            batch_id,
                            unit.usage_count(),
                            e
                        );
                    }
                }

                fan_out(&mut results, &unit.keys, result);
                settled += 1;
                report_progress(on_progress, settled, stats.unique_texts);
            }
        }

        stats.duration = started.elapsed();
        let success = stats.failed_keys * 2 < stats.total_keys;

        info!(
            "Batch {} finished in {:?}: {} cached, {} translated, {} failed",
            batch_id, stats.duration, stats.cache_hits, stats.translated, stats.failed
        );

        BatchOutcome {
            results,
            success,
            stats,
        }
    }
}

impl Drop for BatchTranslator {
    fn drop(&mut self) {
        if let Some(handle) = self.health_check.get_mut().take() {
            handle.abort();
        }
    }
}

/// Work for one unit: wait for quota, call the service and time the call
fn unit_job(
    rate_limiter: Option<Arc<RateLimiter>>,
    text: String,
    translator: Arc<dyn Translate>,
) -> impl Future<Output = (Result<String, TranslationError>, Duration)> + Send + 'static {
    async move {
        if let Some(limiter) = rate_limiter {
            limiter.wait_for_slot().await;
        }
        let call_started = Instant::now();
        let result = translator.translate(&text).await;
        (result, call_started.elapsed())
    }
}

fn fan_out(
    results: &mut HashMap<String, Result<String, TranslationError>>,
    keys: &[String],
    result: Result<String, TranslationError>,
) {
    for key in keys {
        results.insert(key.clone(), result.clone());
    }
}

fn report_progress(on_progress: Option<ProgressCallback<'_>>, settled: usize, total: usize) {
    if let Some(callback) = on_progress {
        if total > 0 {
            callback(settled as f64 / total as f64 * 100.0);
        }
    }
}
