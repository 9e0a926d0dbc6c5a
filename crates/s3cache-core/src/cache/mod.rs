//! Cache management module
//!
//! The cache maps [`CacheKey`]s to object bodies. Callers only see the
//! [`CacheStore`] trait, so the fetcher is written once whether caching is
//! disabled, memory-only or mirrored to disk.

mod key;
mod noop;
mod store;

pub use key::{CacheKey, ParseCacheKeyError};
pub use noop::NoopCache;
pub use store::LruCacheStore;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::error::CacheError;

/// Capacity-bounded key to bytes store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry, marking it most recently used on a hit
    async fn get(&self, key: &CacheKey) -> Option<Bytes>;

    /// Insert or replace an entry, evicting least recently used entries to fit
    ///
    /// An error means the entry could not be mirrored to disk. It is still
    /// resident in memory.
    async fn put(&self, key: CacheKey, value: Bytes) -> Result<(), CacheError>;

    /// Snapshot of counters and occupancy
    async fn stats(&self) -> CacheStats;
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub resident_bytes: u64,
    pub capacity: u64,
}

/// Configuration for the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cache size in bytes, 0 disables caching
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    /// Directory mirroring cache entries, defaults to a temp location
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Mirror entries to `directory` so they survive restarts
    #[serde(default = "default_persist")]
    pub persist: bool,
}

impl CacheConfig {
    /// Directory used for persisted entries
    pub fn directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("s3cache"))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            directory: None,
            persist: default_persist(),
        }
    }
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024 * 1024 // 10 GB
}

fn default_persist() -> bool {
    true
}

/// Build the cache variant selected by `config`
///
/// A disk-backed store rebuilds its index from the directory before it is
/// returned.
pub async fn build_cache(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    if config.max_size == 0 {
        info!("Cache capacity is 0, caching disabled");
        return Ok(Arc::new(NoopCache::new()));
    }

    if !config.persist {
        info!("Initializing in-memory cache (max_size: {} bytes)", config.max_size);
        return Ok(Arc::new(LruCacheStore::in_memory(config.max_size)));
    }

    let directory = config.directory();
    info!(
        "Initializing disk-backed cache (max_size: {} bytes, directory: {:?})",
        config.max_size, directory
    );
    Ok(Arc::new(LruCacheStore::open(config.max_size, directory).await?))
}
