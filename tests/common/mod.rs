/*!
 * Common test utilities for the lingoflow test suite
 */

use anyhow::Result;
use std::path::PathBuf;
use tempfile::TempDir;

use lingoflow::translation::BatchEntry;


/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Path of a database file inside the given directory
pub fn database_path(dir: &TempDir, filename: &str) -> PathBuf {
    dir.path().join(filename)
}

/// Builds batch entries from (key, text) pairs
pub fn entries(pairs: &[(&str, &str)]) -> Vec<BatchEntry> {
    pairs.iter().map(|(key, text)| BatchEntry::new(*key, *text)).collect()
}

/// Installs a test logger; safe to call from every test
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
