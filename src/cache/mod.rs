//! Response cache
//!
//! [`CacheStore`] is the key-value store with per-key expiry, either in
//! process or on disk. [`PartitionedCache`] lays the served data out across
//! many small keys in that store and reassembles it on read.

mod manager;
mod store;

pub use manager::{
    dataset_key, period_key, PartitionedCache, RebuildError, CACHE_TTL, DATASET_INDEX_KEY,
    FEED_INDEX_KEY, MASTER_KEY,
};
pub use store::{CacheError, CacheStore, FileCacheStore, MemoryCacheStore};
