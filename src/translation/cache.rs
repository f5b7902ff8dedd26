/*!
 * Translation caching functionality.
 *
 * This module provides caching mechanisms for translations to avoid
 * redundant API calls and improve performance. Entries expire a fixed time
 * after their last use, the table is bounded in size, and the whole table is
 * persisted as one blob in a `KeyValueStore` after a quiet period. Expired
 * entries are dropped on lookup, before every flush and by an optional
 * periodic sweep.
 */

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::app_config::{CacheConfig, ServiceKind};
use crate::errors::StorageError;
use crate::language_utils::canonical_language_code;
use crate::storage::KeyValueStore;

/// Storage key the serialized table lives under
pub const CACHE_STORAGE_KEY: &str = "translation_cache_v1";

/// Version of the serialized layout
const PERSISTED_VERSION: u32 = 1;

/// Rough per-entry bookkeeping overhead used by the memory estimate
const ENTRY_OVERHEAD_BYTES: usize = 64;

/// Source of wall-clock time in milliseconds
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by chrono
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cache key combining service, languages and source text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    service: ServiceKind,
    source_language: String,
    target_language: String,
    source_text: String,
}

impl CacheKey {
    fn new(source_text: &str, source_language: &str, target_language: &str, service: ServiceKind) -> Self {
        Self {
            service,
            source_language: canonical_language_code(source_language),
            target_language: canonical_language_code(target_language),
            source_text: source_text.to_string(),
        }
    }
}

/// One cached translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub original_text: String,
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    pub service: ServiceKind,
    /// Last time the entry was written or hit, in milliseconds since the epoch
    pub last_touched_at: i64,
    pub hit_count: u64,
}

impl CacheEntry {
    fn key(&self) -> CacheKey {
        CacheKey::new(
            &self.original_text,
            &self.source_language,
            &self.target_language,
            self.service,
        )
    }

    fn is_expired(&self, now: i64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.last_touched_at) >= ttl_ms as i64
    }

    /// Eviction score: hit count plus a recency term in [0, 1]
    fn score(&self, now: i64, ttl_ms: u64) -> f64 {
        let age = now.saturating_sub(self.last_touched_at).max(0) as f64;
        let recency = (1.0 - age / ttl_ms.max(1) as f64).clamp(0.0, 1.0);
        self.hit_count as f64 + recency
    }

    fn estimated_size(&self) -> usize {
        self.original_text.len()
            + self.translated_text.len()
            + self.source_language.len()
            + self.target_language.len()
            + ENTRY_OVERHEAD_BYTES
    }

    fn summary(&self) -> EntrySummary {
        EntrySummary {
            text: self.original_text.clone(),
            hit_count: self.hit_count,
            last_touched_at: self.last_touched_at,
        }
    }
}

/// Short description of an entry used in statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub text: String,
    pub hit_count: u64,
    pub last_touched_at: i64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of live entries
    pub total_entries: usize,
    /// Sum of the hit counts of all entries
    pub total_hits: u64,
    /// Hits over lookups since the cache was created or cleared
    pub hit_rate: f64,
    /// Approximate memory used by the entries, in bytes
    pub memory_estimate: usize,
    /// Least recently touched entry
    pub oldest_entry: Option<EntrySummary>,
    /// Entry with the highest hit count
    pub most_used_entry: Option<EntrySummary>,
}

/// Serialized layout of the table
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
    version: u32,
    saved_at: i64,
    entries: Vec<CacheEntry>,
}

struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    dirty: bool,
}

struct CacheInner {
    state: Mutex<CacheState>,
    store: Option<Arc<dyn KeyValueStore>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    /// Deferred flush, re-armed on every mutation
    pending_flush: Mutex<Option<JoinHandle<()>>>,
    /// Periodic expired-entry sweep, if started
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes writers so an older blob never overwrites a newer one
    flush_lock: Mutex<()>,
}

/// Translation cache for storing and retrieving translations
pub struct TranslationCache {
    inner: Arc<CacheInner>,

    /// Whether caching is enabled
    enabled: bool,
}

impl TranslationCache {
    /// Create a memory-only cache with default settings
    pub fn new(enabled: bool) -> Self {
        let mut cache = Self::in_memory(CacheConfig::default());
        cache.enabled = enabled;
        cache
    }

    /// Create a memory-only cache
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::with_parts(config, None, Arc::new(SystemClock))
    }

    /// Create a cache persisted to `store`, loading what it already holds
    pub fn with_store(config: CacheConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_parts(config, Some(store), Arc::new(SystemClock))
    }

    /// Create a cache from all of its parts
    pub fn with_parts(
        config: CacheConfig,
        store: Option<Arc<dyn KeyValueStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let enabled = config.enabled;
        let inner = Arc::new(CacheInner {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                dirty: false,
            }),
            store,
            config,
            clock,
            pending_flush: Mutex::new(None),
            sweep_task: Mutex::new(None),
            flush_lock: Mutex::new(()),
        });
        inner.load();

        Self { inner, enabled }
    }

    /// Get a translation from the cache
    ///
    /// A hit bumps the entry's hit count and refreshes its TTL. An expired
    /// entry is removed and reported as a miss.
    pub fn get(
        &self,
        source_text: &str,
        source_language: &str,
        target_language: &str,
        service: ServiceKind,
    ) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let key = CacheKey::new(source_text, source_language, target_language, service);
        let now = self.inner.clock.now_ms();
        let ttl_ms = self.inner.config.ttl_ms;

        let result = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let expired = match state.entries.get(&key) {
                Some(entry) => entry.is_expired(now, ttl_ms),
                None => {
                    state.misses += 1;
                    debug!(
                        "Cache miss for '{}' ({} -> {})",
                        truncate_text(source_text, 30),
                        source_language,
                        target_language
                    );
                    return None;
                }
            };

            if expired {
                state.entries.remove(&key);
                state.misses += 1;
                state.dirty = true;
                debug!("Cache entry expired for '{}'", truncate_text(source_text, 30));
                None
            } else if let Some(entry) = state.entries.get_mut(&key) {
                entry.hit_count += 1;
                entry.last_touched_at = now;
                state.hits += 1;
                state.dirty = true;
                debug!(
                    "Cache hit for '{}' ({} -> {})",
                    truncate_text(source_text, 30),
                    source_language,
                    target_language
                );
                Some(entry.translated_text.clone())
            } else {
                None
            }
        };

        self.schedule_flush();
        result
    }

    /// Store a translation in the cache
    ///
    /// Inserting a new key into a full cache first evicts the entries with the
    /// lowest hit count and recency score.
    pub fn set(
        &self,
        source_text: &str,
        source_language: &str,
        target_language: &str,
        service: ServiceKind,
        translation: &str,
    ) {
        if !self.enabled {
            return;
        }

        let key = CacheKey::new(source_text, source_language, target_language, service);
        let now = self.inner.clock.now_ms();

        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let hit_count = match state.entries.get(&key) {
                Some(existing) => existing.hit_count,
                None => {
                    while state.entries.len() >= self.inner.config.max_entries.max(1) {
                        if !evict_lowest(&mut state.entries, now, self.inner.config.ttl_ms) {
                            break;
                        }
                    }
                    0
                }
            };

            let entry = CacheEntry {
                original_text: source_text.to_string(),
                translated_text: translation.to_string(),
                source_language: key.source_language.clone(),
                target_language: key.target_language.clone(),
                service,
                last_touched_at: now,
                hit_count,
            };
            state.entries.insert(key, entry);
            state.dirty = true;
        }

        debug!(
            "Cached translation for '{}' ({} -> {})",
            truncate_text(source_text, 30),
            source_language,
            target_language
        );
        self.schedule_flush();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let lookups = state.hits + state.misses;

        CacheStats {
            total_entries: state.entries.len(),
            total_hits: state.entries.values().map(|e| e.hit_count).sum(),
            hit_rate: if lookups > 0 {
                state.hits as f64 / lookups as f64
            } else {
                0.0
            },
            memory_estimate: state.entries.values().map(CacheEntry::estimated_size).sum(),
            oldest_entry: state
                .entries
                .values()
                .min_by_key(|e| e.last_touched_at)
                .map(CacheEntry::summary),
            most_used_entry: state
                .entries
                .values()
                .max_by_key(|e| e.hit_count)
                .map(CacheEntry::summary),
        }
    }

    /// Remove every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let removed = self.inner.purge_expired();
        if removed > 0 {
            self.schedule_flush();
        }
        removed
    }

    /// Start sweeping expired entries every `sweep_interval_ms`
    ///
    /// Entries removed by a sweep are persisted right away. The task stops
    /// when the last handle to the cache is dropped. Calling this again while
    /// a sweep is running does nothing.
    pub fn spawn_sweep(&self) {
        let mut task = self.inner.sweep_task.lock();
        if task.is_some() {
            return;
        }

        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let period = Duration::from_millis(self.inner.config.sweep_interval_ms.max(1));

        *task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.purge_expired() > 0 {
                    // Failures are logged and handled inside flush
                    let _ = inner.flush();
                }
            }
        }));
    }

    /// Clear the cache
    pub fn clear(&self) {
        {
            let mut state = self.inner.state.lock();
            state.entries.clear();
            state.hits = 0;
            state.misses = 0;
            state.dirty = true;
        }

        debug!("Translation cache cleared");
        self.schedule_flush();
    }

    /// Write pending changes to the store now
    pub fn flush(&self) -> Result<(), StorageError> {
        self.inner.flush()
    }

    /// Cancel the deferred flush and write pending changes
    pub fn dispose(&self) -> Result<(), StorageError> {
        if let Some(pending) = self.inner.pending_flush.lock().take() {
            pending.abort();
        }
        self.inner.flush()
    }

    /// Whether changes are waiting to be persisted
    pub fn has_pending_writes(&self) -> bool {
        self.inner.store.is_some() && self.inner.state.lock().dirty
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Arm (or re-arm) the deferred flush
    ///
    /// Without a tokio runtime the changes stay pending until `flush`,
    /// `dispose` or drop.
    fn schedule_flush(&self) {
        if self.inner.store.is_none() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.config.flush_debounce_ms);

        let mut pending = self.inner.pending_flush.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                // Failures are logged and handled inside flush
                let _ = inner.flush();
            }
        }));
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Clone for TranslationCache {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            enabled: self.enabled,
        }
    }
}

impl CacheInner {
    /// Restore the table from the store, dropping expired entries
    fn load(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let bytes = match store.get_item(CACHE_STORAGE_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read persisted cache, starting empty: {}", e);
                return;
            }
        };

        let persisted: PersistedCache = match serde_json::from_slice(&bytes) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!("Discarding malformed persisted cache: {}", e);
                return;
            }
        };

        let now = self.clock.now_ms();
        let mut live: Vec<CacheEntry> = persisted
            .entries
            .into_iter()
            .filter(|entry| !entry.is_expired(now, self.config.ttl_ms))
            .collect();
        // Keep the entries eviction would keep
        let ttl_ms = self.config.ttl_ms;
        live.sort_by(|a, b| b.score(now, ttl_ms).total_cmp(&a.score(now, ttl_ms)));
        live.truncate(self.config.max_entries);

        let mut state = self.state.lock();
        for entry in live {
            state.entries.insert(entry.key(), entry);
        }
        info!("Loaded {} cached translations", state.entries.len());
    }

    /// Drop expired entries, returning how many were removed
    fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let removed = remove_expired(&mut self.state.lock(), now, self.config.ttl_ms);
        if removed > 0 {
            debug!("Removed {} expired cache entries", removed);
        }
        removed
    }

    /// Persist the table if it changed
    fn flush(&self) -> Result<(), StorageError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let _writer = self.flush_lock.lock();

        let payload = {
            let mut state = self.state.lock();
            if !state.dirty {
                return Ok(());
            }

            let now = self.clock.now_ms();
            let expired = remove_expired(&mut state, now, self.config.ttl_ms);
            if expired > 0 {
                debug!("Dropped {} expired cache entries before persisting", expired);
            }
            let mut payload = serialize_entries(&state.entries, now)?;

            // Near the byte budget, entries untouched for half the TTL go first
            if payload.len().saturating_mul(10) >= self.config.max_storage_bytes.saturating_mul(9) {
                let max_age = (self.config.ttl_ms / 2) as i64;
                let before = state.entries.len();
                state
                    .entries
                    .retain(|_, entry| now.saturating_sub(entry.last_touched_at) < max_age);
                info!(
                    "Cache blob is {} bytes (budget {}), purged {} stale entries",
                    payload.len(),
                    self.config.max_storage_bytes,
                    before - state.entries.len()
                );
                payload = serialize_entries(&state.entries, now)?;
            }

            state.dirty = false;
            payload
        };

        match store.set_item(CACHE_STORAGE_KEY, &payload) {
            Ok(()) => {
                debug!("Persisted translation cache ({} bytes)", payload.len());
                Ok(())
            }
            Err(StorageError::QuotaExceeded(message)) => {
                warn!("Storage quota exceeded, clearing translation cache: {}", message);
                {
                    let mut state = self.state.lock();
                    state.entries.clear();
                    state.dirty = false;
                }
                if let Err(e) = store.remove_item(CACHE_STORAGE_KEY) {
                    warn!("Failed to remove persisted cache: {}", e);
                }
                Err(StorageError::QuotaExceeded(message))
            }
            Err(e) => {
                warn!("Failed to persist translation cache, keeping it in memory: {}", e);
                self.state.lock().dirty = true;
                Err(e)
            }
        }
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        if let Some(pending) = self.pending_flush.get_mut().take() {
            pending.abort();
        }
        if let Some(sweep) = self.sweep_task.get_mut().take() {
            sweep.abort();
        }
        if self.store.is_some() && self.state.get_mut().dirty {
            if let Err(e) = self.flush() {
                warn!("Failed to flush translation cache on drop: {}", e);
            }
        }
    }
}

/// Remove expired entries from the table, marking it dirty if any went
fn remove_expired(state: &mut CacheState, now: i64, ttl_ms: u64) -> usize {
    let before = state.entries.len();
    state.entries.retain(|_, entry| !entry.is_expired(now, ttl_ms));
    let removed = before - state.entries.len();
    if removed > 0 {
        state.dirty = true;
    }
    removed
}

fn serialize_entries(entries: &HashMap<CacheKey, CacheEntry>, now: i64) -> Result<Vec<u8>, StorageError> {
    let persisted = PersistedCache {
        version: PERSISTED_VERSION,
        saved_at: now,
        entries: entries.values().cloned().collect(),
    };
    Ok(serde_json::to_vec(&persisted)?)
}

/// Remove the entry with the lowest score; false when there is nothing to remove
fn evict_lowest(entries: &mut HashMap<CacheKey, CacheEntry>, now: i64, ttl_ms: u64) -> bool {
    let victim = entries
        .iter()
        .min_by(|(_, a), (_, b)| a.score(now, ttl_ms).total_cmp(&b.score(now, ttl_ms)))
        .map(|(key, _)| key.clone());

    match victim {
        Some(key) => {
            entries.remove(&key);
            debug!("Evicted cache entry for '{}'", truncate_text(&key.source_text, 30));
            true
        }
        None => false,
    }
}

/// Truncate text to a maximum number of characters with ellipsis
fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
