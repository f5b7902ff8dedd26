/*!
 * Tests for the key-value stores backing the cache
 */

use std::sync::Arc;

use lingoflow::errors::StorageError;
use lingoflow::storage::{KeyValueStore, MemoryStore, SqliteStore};

use crate::common;

fn exercise_store(store: &dyn KeyValueStore) {
    assert!(store.get_item("missing").unwrap().is_none());

    store.set_item("blob", b"first").unwrap();
    store.set_item("blob", b"second").unwrap();
    assert_eq!(store.get_item("blob").unwrap(), Some(b"second".to_vec()));

    store.remove_item("blob").unwrap();
    assert!(store.get_item("blob").unwrap().is_none());
}

#[test]
fn test_memory_store_throughTrait_shouldBehaveLikeAMap() {
    exercise_store(&MemoryStore::new());
}

#[test]
fn test_sqlite_store_throughTrait_shouldBehaveLikeAMap() {
    exercise_store(&SqliteStore::new_in_memory().unwrap());
}

#[test]
fn test_sqlite_store_withFile_shouldSurviveReopen() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::database_path(&dir, "cache.db");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(&path).unwrap());
        store.set_item("blob", &[0, 1, 2, 255]).unwrap();
    }

    let store = SqliteStore::new(&path).unwrap();
    assert_eq!(store.get_item("blob").unwrap(), Some(vec![0, 1, 2, 255]));
    assert_eq!(store.path(), path.as_path());
}

#[test]
fn test_memory_store_withQuota_shouldReportQuotaExceeded() {
    let store = MemoryStore::with_quota(4);
    let result = store.set_item("blob", b"too large");
    assert!(matches!(result, Err(StorageError::QuotaExceeded(_))));
    assert_eq!(store.used_bytes(), 0);
}
