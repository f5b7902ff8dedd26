/*!
 * Durable key-value storage used by the translation cache.
 *
 * The cache only needs a byte store with three operations; this module defines
 * that contract and ships two implementations:
 * - `MemoryStore`: process-local, with an optional byte quota
 * - `SqliteStore`: a SQLite-backed store that survives restarts
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;

use crate::errors::StorageError;

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

/// Key-value byte store
///
/// Implementations must be safe to share between threads; the cache calls them
/// from its deferred flush task as well as from callers' threads.
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read the value stored under `key`
    fn get_item(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    fn set_item(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove the value stored under `key`, if any
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Vec<u8>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes growing it beyond `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Total bytes stored
    pub fn used_bytes(&self) -> usize {
        self.items.lock().values().map(Vec::len).sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut items = self.items.lock();

        if let Some(quota) = self.quota_bytes {
            let others: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + value.len() > quota {
                return Err(StorageError::QuotaExceeded(format!(
                    "writing {} bytes would exceed the {} byte quota",
                    value.len(),
                    quota
                )));
            }
        }

        items.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.lock().remove(key);
        Ok(())
    }
}
