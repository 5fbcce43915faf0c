//! Key-value cache stores
//!
//! [`CacheStore`] is the small get / put-with-TTL / delete-many interface the
//! partitioned cache is written against. Two stores are provided: an
//! in-process [`MemoryCacheStore`] and a [`FileCacheStore`] that persists each
//! key as a JSON file with an expiry timestamp, so a cache built by
//! `assetfeed pre-cache` survives into the next server start.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when writing to a cache store
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing a cache file failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A cache value could not be serialized
    #[error("Failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A string key-value store with per-entry expiry
///
/// Implementations serialize their own operations; callers may share one
/// store between threads.
pub trait CacheStore: Send + Sync {
    /// Returns the value for `key`, or `None` if absent or expired
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key` for `ttl`
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Removes every listed key; keys that are not present are ignored
    fn remove_all(&self, keys: &[String]) -> Result<(), CacheError>;
}

fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// An in-process cache store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        if Utc::now() > entry.expires_at {
            entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: expiry_from_now(ttl),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
        Ok(())
    }

    fn remove_all(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Wrapper struct for cached values stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// The cached value
    value: String,
    /// When the value was cached
    cached_at: DateTime<Utc>,
    /// When the cache entry expires
    expires_at: DateTime<Utc>,
}

/// A cache store that keeps one JSON file per key
///
/// Files live in an XDG-compliant cache directory (`~/.cache/assetfeed/` on
/// Linux) unless a directory is given explicitly. Expired files read as
/// absent.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl FileCacheStore {
    /// Creates a FileCacheStore using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "assetfeed")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a FileCacheStore with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Returns the directory cache files are written to
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the cache file for the given key
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are hex-escaped so keys such as
    /// `dataset:assetclassratio` map to portable file names.
    fn cache_path(&self, key: &str) -> PathBuf {
        let mut file_name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
                file_name.push(byte as char);
            } else {
                file_name.push_str(&format!("%{:02X}", byte));
            }
        }
        file_name.push_str(".json");
        self.cache_dir.join(file_name)
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        let content = fs::read_to_string(self.cache_path(key)).ok()?;
        let entry: CacheEntry = serde_json::from_str(&content).ok()?;

        if Utc::now() > entry.expires_at {
            return None;
        }
        Some(entry.value)
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let entry = CacheEntry {
            value: value.to_string(),
            cached_at: Utc::now(),
            expires_at: expiry_from_now(ttl),
        };
        let json = serde_json::to_string(&entry)?;

        fs::write(self.cache_path(key), json)?;
        Ok(())
    }

    fn remove_all(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            match fs::remove_file(self.cache_path(key)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    fn create_test_store() -> (FileCacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileCacheStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_memory_put_then_get() {
        let store = MemoryCacheStore::new();

        store.put("0", "{\"a\":[]}", TTL).unwrap();

        assert_eq!(store.get("0").as_deref(), Some("{\"a\":[]}"));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_memory_expired_entry_reads_as_absent() {
        let store = MemoryCacheStore::new();

        store.put("k", "v", Duration::ZERO).unwrap();
        thread::sleep(Duration::from_millis(10));

        assert!(store.get("k").is_none());
        assert!(store.is_empty(), "Expired entry should be dropped on read");
    }

    #[test]
    fn test_memory_remove_all_ignores_missing_keys() {
        let store = MemoryCacheStore::new();
        store.put("a", "1", TTL).unwrap();
        store.put("b", "2", TTL).unwrap();

        store
            .remove_all(&["a".to_string(), "zzz".to_string()])
            .unwrap();

        assert!(store.get("a").is_none());
        assert_eq!(store.get("b").as_deref(), Some("2"));
    }

    #[test]
    fn test_file_put_creates_escaped_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();

        store.put("dataset:other", "[1]", TTL).expect("Write should succeed");

        let expected_path = temp_dir.path().join("dataset%3Aother.json");
        assert!(expected_path.exists(), "Cache file should exist");
        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"value\""));
        assert!(content.contains("\"expires_at\""));
    }

    #[test]
    fn test_file_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        assert!(store.get("nonexistent_key").is_none());
    }

    #[test]
    fn test_file_roundtrip_and_overwrite() {
        let (store, _temp_dir) = create_test_store();

        store.put("key", "first", TTL).unwrap();
        store.put("key", "second", TTL).unwrap();

        assert_eq!(store.get("key").as_deref(), Some("second"));
    }

    #[test]
    fn test_file_expired_entry_reads_as_absent() {
        let (store, _temp_dir) = create_test_store();

        store.put("expired_key", "v", Duration::ZERO).unwrap();
        thread::sleep(Duration::from_millis(10));

        assert!(store.get("expired_key").is_none());
    }

    #[test]
    fn test_file_corrupt_entry_reads_as_absent() {
        let (store, temp_dir) = create_test_store();
        fs::write(temp_dir.path().join("0.json"), "not json").unwrap();

        assert!(store.get("0").is_none());
    }

    #[test]
    fn test_file_remove_all_ignores_missing_keys() {
        let (store, _temp_dir) = create_test_store();
        store.put("a", "1", TTL).unwrap();

        store
            .remove_all(&["a".to_string(), "never-written".to_string()])
            .expect("Removing missing keys should succeed");

        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_file_put_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = FileCacheStore::with_dir(nested_path.clone());

        store.put("nested_key", "v", TTL).expect("Write should succeed");

        assert!(nested_path.join("nested_key.json").exists());
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileCacheStore::new() {
            let path_str = store.cache_dir().to_string_lossy();
            assert!(path_str.contains("assetfeed"), "Cache path should contain project name");
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
