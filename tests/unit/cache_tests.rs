/*!
 * Tests for translation cache functionality
 */

use std::sync::Arc;

use lingoflow::app_config::{CacheConfig, ServiceKind};
use lingoflow::errors::StorageError;
use lingoflow::storage::{KeyValueStore, MemoryStore};
use lingoflow::translation::cache::{CACHE_STORAGE_KEY, ManualClock, TranslationCache};

use crate::common::mock_translators::{FailingStore, StoreFailure};

const SERVICE: ServiceKind = ServiceKind::OpenAI;

fn cache_with_store(store: Arc<dyn KeyValueStore>, max_entries: usize) -> TranslationCache {
    let config = CacheConfig {
        max_entries,
        ..CacheConfig::default()
    };
    TranslationCache::with_parts(config, Some(store), Arc::new(ManualClock::new(1_000)))
}

#[test]
fn test_cache_new_withDisabled_shouldNeverStore() {
    let cache = TranslationCache::new(false);
    cache.set("hello", "en", "fr", SERVICE, "bonjour");

    assert!(cache.get("hello", "en", "fr", SERVICE).is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_cache_set_withEnabledCache_shouldStoreTranslation() {
    let cache = TranslationCache::new(true);
    cache.set("hello", "en", "fr", SERVICE, "bonjour");

    assert_eq!(cache.get("hello", "en", "fr", SERVICE), Some("bonjour".to_string()));
}

#[test]
fn test_cache_get_withDifferentLanguages_shouldReturnNone() {
    let cache = TranslationCache::new(true);
    cache.set("hello", "en", "fr", SERVICE, "bonjour");

    assert!(cache.get("hello", "de", "fr", SERVICE).is_none());
    assert!(cache.get("hello", "en", "es", SERVICE).is_none());
}

#[test]
fn test_cache_set_withMultipleEntries_shouldStoreAll() {
    let cache = TranslationCache::new(true);
    cache.set("hello", "en", "fr", SERVICE, "bonjour");
    cache.set("goodbye", "en", "fr", SERVICE, "au revoir");
    cache.set("hello", "en", "es", SERVICE, "hola");

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get("goodbye", "en", "fr", SERVICE), Some("au revoir".to_string()));
    assert_eq!(cache.get("hello", "en", "es", SERVICE), Some("hola".to_string()));
}

#[test]
fn test_cache_clear_shouldRemoveEntriesAndResetStats() {
    let cache = TranslationCache::new(true);
    cache.set("hello", "en", "fr", SERVICE, "bonjour");
    cache.get("hello", "en", "fr", SERVICE);
    cache.clear();

    assert!(cache.is_empty());
    let stats = cache.stats();
    assert_eq!(stats.total_entries, 0);
    assert_eq!(stats.hit_rate, 0.0);
    assert!(stats.oldest_entry.is_none());
}

#[test]
fn test_cache_stats_shouldReportHitRateAndMostUsed() {
    let cache = TranslationCache::new(true);
    cache.set("hello", "en", "fr", SERVICE, "bonjour");
    cache.set("world", "en", "fr", SERVICE, "monde");

    cache.get("hello", "en", "fr", SERVICE);
    cache.get("hello", "en", "fr", SERVICE);
    cache.get("world", "en", "fr", SERVICE);
    cache.get("missing", "en", "fr", SERVICE);

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.total_hits, 3);
    assert_eq!(stats.hit_rate, 0.75);
    assert!(stats.memory_estimate > 0);
    assert_eq!(stats.most_used_entry.unwrap().text, "hello");
}

#[test]
fn test_cache_clone_shouldShareEntries() {
    let cache = TranslationCache::new(true);
    let clone = cache.clone();
    cache.set("hello", "en", "fr", SERVICE, "bonjour");

    assert_eq!(clone.get("hello", "en", "fr", SERVICE), Some("bonjour".to_string()));
}

#[test]
fn test_cache_set_beyondCapacity_shouldStayBounded() {
    let cache = TranslationCache::in_memory(CacheConfig {
        max_entries: 5,
        ..CacheConfig::default()
    });

    for i in 0..50 {
        cache.set(&format!("text {i}"), "en", "fr", SERVICE, &format!("texte {i}"));
        assert!(cache.len() <= 5);
    }
    assert_eq!(cache.len(), 5);
}

#[test]
fn test_flush_withQuotaFailure_shouldClearMemory() {
    let store = Arc::new(FailingStore::new(StoreFailure::Quota));
    let cache = cache_with_store(store.clone(), 100);
    cache.set("hello", "en", "fr", SERVICE, "bonjour");

    let result = cache.flush();
    assert!(matches!(result, Err(StorageError::QuotaExceeded(_))));
    assert!(cache.is_empty());
    assert!(!cache.has_pending_writes());
}

#[test]
fn test_flush_withBackendFailure_shouldKeepMemoryAndRetry() {
    let store = Arc::new(FailingStore::new(StoreFailure::Backend));
    let cache = cache_with_store(store.clone(), 100);
    cache.set("hello", "en", "fr", SERVICE, "bonjour");

    assert!(matches!(cache.flush(), Err(StorageError::Backend(_))));
    assert_eq!(cache.get("hello", "en", "fr", SERVICE), Some("bonjour".to_string()));
    assert!(cache.has_pending_writes());

    assert!(cache.flush().is_err());
    assert_eq!(store.write_attempts(), 2);
}

#[test]
fn test_flush_withoutChanges_shouldNotWrite() {
    let store = Arc::new(FailingStore::new(StoreFailure::Backend));
    let cache = cache_with_store(store.clone(), 100);

    cache.flush().unwrap();
    assert_eq!(store.write_attempts(), 0);
}

#[test]
fn test_load_shouldDropExpiredEntries() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let config = CacheConfig {
        ttl_ms: 1_000,
        ..CacheConfig::default()
    };

    let cache = TranslationCache::with_parts(config.clone(), Some(store.clone()), clock.clone());
    cache.set("old", "en", "fr", SERVICE, "vieux");
    clock.set(600);
    cache.set("recent", "en", "fr", SERVICE, "récent");
    cache.dispose().unwrap();
    drop(cache);

    clock.set(1_200);
    let reloaded = TranslationCache::with_parts(config, Some(store.clone()), clock);
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get("recent", "en", "fr", SERVICE).is_some());
    assert!(store.get_item(CACHE_STORAGE_KEY).unwrap().is_some());
}

fn stored_blob(store: &dyn KeyValueStore) -> String {
    let bytes = store.get_item(CACHE_STORAGE_KEY).unwrap().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[test]
fn test_flush_withExpiredUnreadEntry_shouldDropItFromMemoryAndStore() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let config = CacheConfig {
        ttl_ms: 1_000,
        ..CacheConfig::default()
    };
    let cache = TranslationCache::with_parts(config, Some(store.clone()), clock.clone());

    cache.set("stale", "en", "fr", SERVICE, "périmé");
    cache.flush().unwrap();
    assert!(stored_blob(store.as_ref()).contains("stale"));

    clock.set(10_000);
    cache.set("fresh", "en", "fr", SERVICE, "frais");
    cache.flush().unwrap();

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().total_entries, 1);
    assert_eq!(cache.stats().oldest_entry.unwrap().text, "fresh");
    let blob = stored_blob(store.as_ref());
    assert!(blob.contains("fresh"));
    assert!(!blob.contains("stale"));
}

#[tokio::test(start_paused = true)]
async fn test_spawnSweep_shouldPurgeUnreadExpiredEntriesAndPersist() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let config = CacheConfig {
        ttl_ms: 1_000,
        sweep_interval_ms: 5_000,
        // Only the sweep writes in this test
        flush_debounce_ms: 600_000,
        ..CacheConfig::default()
    };
    let cache = TranslationCache::with_parts(config, Some(store.clone()), clock.clone());
    cache.set("stale", "en", "fr", SERVICE, "périmé");
    cache.flush().unwrap();

    cache.spawn_sweep();
    cache.spawn_sweep();

    clock.set(2_000);
    tokio::time::sleep(std::time::Duration::from_millis(5_100)).await;

    assert!(cache.is_empty());
    assert_eq!(cache.stats().total_entries, 0);
    assert!(!cache.has_pending_writes());
    assert!(!stored_blob(store.as_ref()).contains("stale"));
}

#[test]
fn test_load_overCapacity_shouldKeepHighestScoringEntries() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));

    let writer = TranslationCache::with_parts(CacheConfig::default(), Some(store.clone()), clock.clone());
    writer.set("popular", "en", "fr", SERVICE, "populaire");
    clock.set(100);
    for _ in 0..3 {
        writer.get("popular", "en", "fr", SERVICE);
    }
    clock.set(500);
    writer.set("recent one", "en", "fr", SERVICE, "récent un");
    clock.set(600);
    writer.set("recent two", "en", "fr", SERVICE, "récent deux");
    writer.dispose().unwrap();
    drop(writer);

    clock.set(700);
    let config = CacheConfig {
        max_entries: 2,
        ..CacheConfig::default()
    };
    let reloaded = TranslationCache::with_parts(config, Some(store), clock);

    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.get("popular", "en", "fr", SERVICE).is_some());
    assert!(reloaded.get("recent two", "en", "fr", SERVICE).is_some());
    assert!(reloaded.get("recent one", "en", "fr", SERVICE).is_none());
}
