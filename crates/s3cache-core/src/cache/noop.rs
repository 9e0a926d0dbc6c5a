//! Pass-through cache used when caching is disabled

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CacheKey, CacheStats, CacheStore};
use crate::error::CacheError;

/// Cache that never holds anything
///
/// Every lookup is a miss and every write is dropped.
#[derive(Debug, Default)]
pub struct NoopCache {
    misses: AtomicU64,
}

impl NoopCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for NoopCache {
    async fn get(&self, _key: &CacheKey) -> Option<Bytes> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("s3cache_cache_misses_total").increment(1);
        None
    }

    async fn put(&self, _key: CacheKey, _value: Bytes) -> Result<(), CacheError> {
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            misses: self.misses.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}
