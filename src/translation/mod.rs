/*!
 * Batch translation pipeline.
 *
 * This module contains everything between a list of keyed texts and the
 * caller-supplied `Translate` implementation. It is split into several
 * submodules:
 *
 * - `batch`: The orchestrator tying the other parts together
 * - `dedup`: Deduplication, prioritisation and chunking of entries
 * - `pool`: Bounded priority work pool
 * - `rate_limiter`: Sliding-window vendor quota limiter
 * - `adaptive`: Adaptive concurrency manager
 * - `concurrency`: Per-service concurrency profiles
 * - `cache`: Persistent translation cache
 */

// Re-export main types for easier usage
pub use self::adaptive::{AdaptiveConcurrencyManager, NetworkCondition, PerformanceSample};
pub use self::batch::{BatchOutcome, BatchStats, BatchTranslator, FnTranslator, Translate};
pub use self::cache::{CacheStats, TranslationCache};
pub use self::concurrency::{ConcurrencyBounds, ConcurrencyConfig, ServiceProfile};
pub use self::dedup::{BatchEntry, TextUnit};
pub use self::pool::{PoolStatus, WorkPool};
pub use self::rate_limiter::RateLimiter;

// Submodules
pub mod adaptive;
pub mod batch;
pub mod cache;
pub mod concurrency;
pub mod dedup;
pub mod pool;
pub mod rate_limiter;
