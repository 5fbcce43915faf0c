//! Partitioned cache for dataset and feed responses
//!
//! Cache stores cap the size of a single value, so the combined response is
//! never written as one entry. Instead each dataset and each feed period gets
//! its own partition key, and an index key per family lists the partitions
//! that are currently valid:
//!
//! | key | value |
//! |---|---|
//! | `0` | every normalized dataset, keyed by dataset name |
//! | `datasets` | index of the `dataset:<name>` partition keys |
//! | `dataset:<name>` | one dataset's records (name lower-cased) |
//! | `transactions` | index of the `transactions:<YYYYMM>` keys, newest first |
//! | `transactions:<YYYYMM>` | one feed period's transactions |
//!
//! A read only succeeds when the master key, the feed index and every indexed
//! partition are present; anything less is a miss and the caller computes the
//! response from the source instead.

use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::store::{CacheError, CacheStore};
use crate::snapshot::{records_value, Snapshot, FEED_FIELD};
use crate::source::{DataSource, SourceError};

/// Time-to-live applied to every cache key (6 hours)
pub const CACHE_TTL: Duration = Duration::from_secs(21_600);

/// Key holding every normalized dataset in one object
pub const MASTER_KEY: &str = "0";

/// Index key listing the dataset partition keys
pub const DATASET_INDEX_KEY: &str = "datasets";

/// Index key listing the feed period partition keys
pub const FEED_INDEX_KEY: &str = "transactions";

/// Partition key for one dataset
pub fn dataset_key(name: &str) -> String {
    format!("dataset:{}", name.to_lowercase())
}

/// Partition key for one feed period
pub fn period_key(period: &str) -> String {
    format!("{}:{}", FEED_INDEX_KEY, period)
}

/// Errors that can occur while rebuilding the cache
#[derive(Debug, Error)]
pub enum RebuildError {
    /// The source data could not be read
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The cache store rejected a write
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Reads and rebuilds the partitioned cache on top of a [`CacheStore`]
///
/// Without a store every read is a miss and rebuilds write nothing.
pub struct PartitionedCache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    /// Serializes rebuilds; readers never take it
    rebuild_lock: Mutex<()>,
}

impl PartitionedCache {
    /// Creates a PartitionedCache over an optional store, using [`CACHE_TTL`]
    pub fn new(store: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            store,
            ttl: CACHE_TTL,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Creates a PartitionedCache with no backing store
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Overrides the TTL written with each key
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether a backing store is configured
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Recomputes everything from `source` and replaces the cached partitions
    ///
    /// # Returns
    /// * `Ok(keys)` - Every key written, master key first
    /// * `Err(RebuildError)` - If the source cannot be read or a write fails
    pub fn rebuild(&self, source: &dyn DataSource) -> Result<Vec<String>, RebuildError> {
        let snapshot = Snapshot::load(source)?;
        Ok(self.write_snapshot(&snapshot)?)
    }

    /// Replaces the cached partitions with the contents of `snapshot`
    ///
    /// Write order: stale partitions listed by the old indexes are evicted,
    /// then the well-known keys, then new partitions are written, then the
    /// indexes, and the master key last.
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<Vec<String>, CacheError> {
        let _guard = self.rebuild_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(store) = self.store.as_deref() else {
            warn!("cache store unavailable; nothing cached");
            return Ok(Vec::new());
        };

        let stale: Vec<String> = [DATASET_INDEX_KEY, FEED_INDEX_KEY]
            .iter()
            .filter_map(|index_key| read_index(store, index_key))
            .flatten()
            .collect();
        if !stale.is_empty() {
            debug!(keys = stale.len(), "evicting partitions from previous index");
            store.remove_all(&stale)?;
        }
        store.remove_all(&[
            MASTER_KEY.to_string(),
            DATASET_INDEX_KEY.to_string(),
            FEED_INDEX_KEY.to_string(),
        ])?;

        let mut dataset_keys = Vec::with_capacity(snapshot.datasets.len());
        for (name, records) in &snapshot.datasets {
            let key = dataset_key(name);
            let value = serde_json::to_string(&records_value(records))?;
            store.put(&key, &value, self.ttl)?;
            dataset_keys.push(key);
        }

        let mut period_keys = Vec::with_capacity(snapshot.periods.len());
        for period in &snapshot.periods {
            let key = period_key(&period.period);
            let value = serde_json::to_string(&period.entries)?;
            store.put(&key, &value, self.ttl)?;
            period_keys.push(key);
        }

        store.put(DATASET_INDEX_KEY, &serde_json::to_string(&dataset_keys)?, self.ttl)?;
        store.put(FEED_INDEX_KEY, &serde_json::to_string(&period_keys)?, self.ttl)?;

        let master = Value::Object(snapshot.datasets_object());
        store.put(MASTER_KEY, &serde_json::to_string(&master)?, self.ttl)?;

        let mut written = Vec::with_capacity(dataset_keys.len() + period_keys.len() + 3);
        written.push(MASTER_KEY.to_string());
        written.push(DATASET_INDEX_KEY.to_string());
        written.extend(dataset_keys);
        written.push(FEED_INDEX_KEY.to_string());
        written.extend(period_keys);

        info!(keys = written.len(), "cache rebuilt");
        Ok(written)
    }

    /// Reads the combined response: every dataset plus the feed transactions
    ///
    /// Returns `None` on any miss: no store, a missing or corrupt master or
    /// index key, or any indexed period partition missing or corrupt.
    pub fn read_all(&self) -> Option<Value> {
        let store = self.store.as_deref()?;

        let Value::Object(mut combined) = read_json(store, MASTER_KEY)? else {
            warn!(key = MASTER_KEY, "cached master is not an object");
            return None;
        };
        let index = read_index(store, FEED_INDEX_KEY)?;

        let mut transactions = Vec::new();
        for key in &index {
            let Value::Array(entries) = read_json(store, key)? else {
                warn!(key = %key, "cached feed partition is not an array");
                return None;
            };
            transactions.extend(entries);
        }

        debug!(periods = index.len(), "serving combined response from cache");
        combined.insert(FEED_FIELD.to_string(), Value::Array(transactions));
        Some(Value::Object(combined))
    }

    /// Reads one dataset's cached records, matching the name case-insensitively
    pub fn read_dataset(&self, name: &str) -> Option<Value> {
        let store = self.store.as_deref()?;
        let key = dataset_key(name);

        match read_json(store, &key)? {
            value @ Value::Array(_) => Some(value),
            _ => {
                warn!(key = %key, "cached dataset is not an array");
                None
            }
        }
    }
}

/// Reads and parses one key; absent and corrupt values are both `None`
fn read_json(store: &dyn CacheStore, key: &str) -> Option<Value> {
    let Some(raw) = store.get(key) else {
        debug!(key = %key, "cache miss");
        return None;
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key = %key, error = %err, "ignoring corrupt cache entry");
            None
        }
    }
}

/// Reads an index key as a list of partition keys
fn read_index(store: &dyn CacheStore, key: &str) -> Option<Vec<String>> {
    let value = read_json(store, key)?;
    match serde_json::from_value(value) {
        Ok(keys) => Some(keys),
        Err(err) => {
            warn!(key = %key, error = %err, "ignoring malformed cache index");
            None
        }
    }
}
