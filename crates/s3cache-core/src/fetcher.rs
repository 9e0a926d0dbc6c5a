//! Read-through object fetching

use bytes::Bytes;
use s3cache_storage::BlobStore;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore};
use crate::error::CoreError;

/// Fetches objects through the cache
///
/// A hit never touches the backend. A miss fetches from the backend and
/// populates the cache before returning, even if the caller ends up
/// discarding the bytes.
pub struct ObjectFetcher {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn BlobStore>,
}

impl ObjectFetcher {
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn BlobStore>) -> Self {
        Self { cache, store }
    }

    /// Cache key for a backend address
    pub fn cache_key(bucket: &str, key: &str) -> CacheKey {
        CacheKey::derive(bucket, key)
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Fetch `bucket/key`, from the cache when possible
    pub async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, CoreError> {
        let cache_key = Self::cache_key(bucket, key);

        if let Some(data) = self.cache.get(&cache_key).await {
            debug!("Cache hit for {}/{} ({})", bucket, key, cache_key);
            return Ok(data);
        }

        debug!("Cache miss for {}/{} ({}), fetching from backend", bucket, key, cache_key);

        // Backend failures propagate without touching the cache
        let data = self.store.get_object(bucket, key).await?;

        if let Err(e) = self.cache.put(cache_key, data.clone()).await {
            warn!("Serving {}/{} without a persisted cache copy: {}", bucket, key, e);
        }

        Ok(data)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use s3cache_storage::{Listing, StorageError};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::cache::{LruCacheStore, NoopCache};

    /// Backend stub that counts calls
    #[derive(Default)]
    pub(crate) struct StubStore {
        pub objects: HashMap<(String, String), Bytes>,
        pub listings: HashMap<(String, String), Listing>,
        pub get_calls: AtomicUsize,
        pub list_calls: AtomicUsize,
    }

    impl StubStore {
        pub fn with_object(mut self, bucket: &str, key: &str, data: &'static [u8]) -> Self {
            self.objects
                .insert((bucket.to_string(), key.to_string()), Bytes::from_static(data));
            self
        }

        pub fn with_listing(mut self, bucket: &str, prefix: &str, listing: Listing) -> Self {
            self.listings
                .insert((bucket.to_string(), prefix.to_string()), listing);
            self
        }

        pub fn get_calls(&self) -> usize {
            self.get_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlobStore for StubStore {
        async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.objects
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| StorageError::NotFound("no such key".to_string()))
        }

        async fn list_objects(
            &self,
            bucket: &str,
            prefix: &str,
            _delimiter: &str,
        ) -> Result<Listing, StorageError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if bucket == "denied" {
                return Err(StorageError::AccessDenied("Access Denied".to_string()));
            }
            Ok(self
                .listings
                .get(&(bucket.to_string(), prefix.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_read_through() {
        let store = Arc::new(StubStore::default().with_object("pkgs", "x.txt", b"hello"));
        let fetcher = ObjectFetcher::new(Arc::new(LruCacheStore::in_memory(1024)), store.clone());

        assert_eq!(fetcher.fetch("pkgs", "x.txt").await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(store.get_calls(), 1);

        assert_eq!(fetcher.fetch("pkgs", "x.txt").await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(store.get_calls(), 1);

        let stats = fetcher.cache().stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_cached() {
        let store = Arc::new(StubStore::default());
        let fetcher = ObjectFetcher::new(Arc::new(LruCacheStore::in_memory(1024)), store.clone());

        let err = fetcher.fetch("pkgs", "missing.tar.gz").await.unwrap_err();
        assert_eq!(err.message(), "no such key");
        assert!(matches!(err, CoreError::Backend(StorageError::NotFound(_))));

        fetcher.fetch("pkgs", "missing.tar.gz").await.unwrap_err();
        assert_eq!(store.get_calls(), 2);
        assert_eq!(fetcher.cache().stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_noop_cache_always_hits_backend() {
        let store = Arc::new(StubStore::default().with_object("pkgs", "x.txt", b"hello"));
        let fetcher = ObjectFetcher::new(Arc::new(NoopCache::new()), store.clone());

        for expected_calls in 1..=3 {
            assert_eq!(fetcher.fetch("pkgs", "x.txt").await.unwrap(), Bytes::from_static(b"hello"));
            assert_eq!(store.get_calls(), expected_calls);
        }
        assert_eq!(fetcher.cache().stats().await.hits, 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_still_serves() {
        let dir = tempfile::tempdir().unwrap();
        let entries = dir.path().join("entries");
        let cache = LruCacheStore::open(1024, &entries).await.unwrap();
        std::fs::remove_dir_all(&entries).unwrap();

        let store = Arc::new(StubStore::default().with_object("pkgs", "x.txt", b"hello"));
        let fetcher = ObjectFetcher::new(Arc::new(cache), store.clone());

        assert_eq!(fetcher.fetch("pkgs", "x.txt").await.unwrap(), Bytes::from_static(b"hello"));
        // Still resident in memory
        assert_eq!(fetcher.fetch("pkgs", "x.txt").await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(store.get_calls(), 1);
    }

    #[test]
    fn test_cache_key_matches_derivation() {
        assert_eq!(
            ObjectFetcher::cache_key("bucket1", "a/b"),
            CacheKey::derive("bucket1", "a/b")
        );
        assert_ne!(
            ObjectFetcher::cache_key("bucket1", "a/b"),
            ObjectFetcher::cache_key("bucket1", "a/c")
        );
    }
}
