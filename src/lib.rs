/*!
 * # lingoflow
 *
 * A Rust library for translating large batches of keyed texts through
 * rate-limited translation services.
 *
 * ## Features
 *
 * - Deduplication of repeated texts, so each text is translated once
 * - Priority dispatch through a bounded work pool
 * - Vendor quota enforcement with a sliding-window rate limiter
 * - Adaptive concurrency driven by observed latency and error rates
 * - Persistent translation cache with TTL, size bound and debounced writes
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `translation`: The batch pipeline:
 *   - `translation::batch`: Batch orchestration
 *   - `translation::dedup`: Deduplication and chunking
 *   - `translation::pool`: Bounded priority work pool
 *   - `translation::rate_limiter`: Vendor quota limiter
 *   - `translation::adaptive`: Adaptive concurrency manager
 *   - `translation::cache`: Caching mechanisms for translations
 * - `storage`: Durable key-value stores backing the cache
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod errors;
pub mod language_utils;
pub mod storage;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::{Config, ServiceKind};
pub use errors::{AppError, PoolError, StorageError, TranslationError, TranslationErrorKind};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use translation::{BatchEntry, BatchOutcome, BatchTranslator, Translate, TranslationCache};
