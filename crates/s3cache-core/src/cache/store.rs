//! LRU cache store with optional disk mirror

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CacheKey, CacheStats, CacheStore};
use crate::error::CacheError;

struct Entry {
    size: u64,
    /// `None` while the body only lives on disk (entries restored at startup)
    body: Option<Bytes>,
    /// A file for this entry exists in the cache directory
    persisted: bool,
}

struct Inner {
    lru: LruCache<CacheKey, Entry>,
    resident_bytes: u64,
}

impl Inner {
    fn insert(&mut self, key: CacheKey, entry: Entry) -> Option<Entry> {
        self.resident_bytes += entry.size;
        let replaced = self.lru.put(key, entry);
        if let Some(old) = &replaced {
            self.resident_bytes -= old.size;
        }
        replaced
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Entry> {
        let removed = self.lru.pop(key);
        if let Some(entry) = &removed {
            self.resident_bytes -= entry.size;
        }
        removed
    }

    /// Pop least recently used entries until the resident size fits `capacity`
    ///
    /// `keep` is never evicted, so an entry larger than the whole capacity
    /// ends up alone in the cache instead of being dropped.
    fn evict_to(&mut self, capacity: u64, keep: Option<&CacheKey>) -> Vec<(CacheKey, Entry)> {
        let mut evicted = Vec::new();

        while self.resident_bytes > capacity {
            let at_keep = match self.lru.peek_lru() {
                None => true,
                Some((key, _)) => Some(key) == keep,
            };
            if at_keep {
                break;
            }

            if let Some((key, entry)) = self.lru.pop_lru() {
                self.resident_bytes -= entry.size;
                evicted.push((key, entry));
            }
        }

        evicted
    }
}

/// Capacity-bounded cache with least-recently-used eviction
///
/// Entries are held in memory. With a directory configured each entry is
/// also written to `<directory>/<key>`, and a store opened over an existing
/// directory picks those files back up. The in-memory index decides what is
/// cached; a file that the index does not know about is never served.
///
/// A single mutex guards the index, the rename that publishes an entry
/// file and the removal of evicted files, so no caller ever sees an entry
/// that is only half there. Entry bodies are written to a temp file before
/// the lock is taken.
pub struct LruCacheStore {
    inner: Mutex<Inner>,
    capacity: u64,
    directory: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Distinguishes temp files of concurrent writes to the same key
    staging: AtomicU64,
}

impl LruCacheStore {
    fn with_directory(capacity: u64, directory: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::unbounded(),
                resident_bytes: 0,
            }),
            capacity,
            directory,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            staging: AtomicU64::new(0),
        }
    }

    /// Create a memory-only store
    pub fn in_memory(capacity: u64) -> Self {
        Self::with_directory(capacity, None)
    }

    /// Open a disk-backed store, indexing entries already in `directory`
    pub async fn open(capacity: u64, directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();

        fs::create_dir_all(&directory)
            .await
            .map_err(|source| CacheError::Directory {
                path: directory.clone(),
                source,
            })?;

        let store = Self::with_directory(capacity, Some(directory.clone()));
        store
            .rebuild()
            .await
            .map_err(|source| CacheError::Directory {
                path: directory,
                source,
            })?;

        Ok(store)
    }

    /// Index the entry files left by a previous run
    ///
    /// Bodies stay on disk until first read. Recency is approximated by file
    /// modification time, oldest first.
    async fn rebuild(&self) -> std::io::Result<()> {
        let Some(directory) = &self.directory else {
            return Ok(());
        };

        let mut found = Vec::new();
        let mut dir = fs::read_dir(directory).await?;

        while let Some(dir_entry) = dir.next_entry().await? {
            let path = dir_entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            // Leftover from an interrupted write: `<key>.<n>.tmp`
            if name.ends_with(".tmp")
                && name
                    .get(..CacheKey::HEX_LEN)
                    .is_some_and(|stem| stem.parse::<CacheKey>().is_ok())
            {
                debug!("Removing stale temp file {:?}", path);
                if let Err(e) = fs::remove_file(&path).await {
                    warn!("Failed to remove stale temp file {:?}: {}", path, e);
                }
                continue;
            }

            let Ok(key) = name.parse::<CacheKey>() else {
                continue;
            };

            let metadata = dir_entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, key, metadata.len()));
        }

        found.sort_by_key(|(modified, _, _)| *modified);

        let mut inner = self.inner.lock().await;
        for (_, key, size) in found {
            inner.insert(
                key,
                Entry {
                    size,
                    body: None,
                    persisted: true,
                },
            );
        }

        let evicted = inner.evict_to(self.capacity, None);
        self.discard(evicted).await;

        info!(
            "Restored {} cache entries ({} bytes) from {:?}",
            inner.lru.len(),
            inner.resident_bytes,
            directory
        );
        metrics::gauge!("s3cache_cache_resident_bytes").set(inner.resident_bytes as f64);

        Ok(())
    }

    fn entry_path(directory: &Path, key: &CacheKey) -> PathBuf {
        directory.join(key.to_hex())
    }

    /// Delete the files of evicted entries
    ///
    /// Called with the index lock held so a concurrent re-insert of the same
    /// key cannot have its fresh file removed.
    async fn discard(&self, evicted: Vec<(CacheKey, Entry)>) {
        if evicted.is_empty() {
            return;
        }

        metrics::counter!("s3cache_cache_evictions_total").increment(evicted.len() as u64);

        for (key, entry) in evicted {
            debug!("Evicting cache entry {} ({} bytes)", key, entry.size);
            if entry.persisted {
                self.remove_file(&key).await;
            }
        }
    }

    async fn remove_file(&self, key: &CacheKey) {
        let Some(directory) = &self.directory else {
            return;
        };

        let path = Self::entry_path(directory, key);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete cache file {:?}: {}", path, e),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("s3cache_cache_hits_total").increment(1);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("s3cache_cache_misses_total").increment(1);
    }
}

/// Write `value` to a temp file next to `path`, returning the temp path
async fn stage_entry(path: &Path, seq: u64, value: &[u8]) -> std::io::Result<PathBuf> {
    let temp_path = path.with_extension(format!("{}.tmp", seq));

    if let Err(e) = fs::write(&temp_path, value).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(temp_path)
}

/// Move a staged temp file into place
async fn publish_entry(temp_path: &Path, path: &Path) -> std::io::Result<()> {
    let renamed = fs::rename(temp_path, path).await;
    if renamed.is_err() {
        let _ = fs::remove_file(temp_path).await;
    }
    renamed
}

#[async_trait]
impl CacheStore for LruCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let body = match inner.lru.get(key) {
            Some(entry) => entry.body.clone(),
            None => {
                self.record_miss();
                return None;
            }
        };

        if let Some(body) = body {
            self.record_hit();
            return Some(body);
        }

        // Index-only entry: read the file and promote the body into memory
        let read = match &self.directory {
            Some(directory) => fs::read(Self::entry_path(directory, key)).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "cache has no directory",
            )),
        };

        match read {
            Ok(data) => {
                let data = Bytes::from(data);
                if let Some(entry) = inner.lru.peek_mut(key) {
                    let size = data.len() as u64;
                    inner.resident_bytes = inner.resident_bytes - entry.size + size;
                    entry.size = size;
                    entry.body = Some(data.clone());
                }

                // The file may have changed size behind our back
                let evicted = inner.evict_to(self.capacity, Some(key));
                self.discard(evicted).await;
                metrics::gauge!("s3cache_cache_resident_bytes").set(inner.resident_bytes as f64);

                debug!("Loaded cache entry {} from disk", key);
                self.record_hit();
                Some(data)
            }
            Err(e) => {
                warn!("Failed to read cache file for {}, dropping entry: {}", key, e);
                inner.remove(key);
                metrics::gauge!("s3cache_cache_resident_bytes").set(inner.resident_bytes as f64);

                self.record_miss();
                None
            }
        }
    }

    async fn put(&self, key: CacheKey, value: Bytes) -> Result<(), CacheError> {
        let size = value.len() as u64;

        let staged = match &self.directory {
            Some(directory) => {
                let path = Self::entry_path(directory, &key);
                let seq = self.staging.fetch_add(1, Ordering::Relaxed);
                Some((stage_entry(&path, seq, &value).await, path))
            }
            None => None,
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let written = match staged {
            Some((Ok(temp_path), path)) => Some(publish_entry(&temp_path, &path).await),
            Some((Err(e), _)) => Some(Err(e)),
            None => None,
        };
        let persisted = matches!(written, Some(Ok(())));

        let replaced = inner.insert(
            key,
            Entry {
                size,
                body: Some(value),
                persisted,
            },
        );

        // A failed rewrite must not leave the previous body behind on disk
        if let Some(old) = replaced
            && old.persisted
            && !persisted
        {
            self.remove_file(&key).await;
        }

        if size > self.capacity {
            warn!(
                "Cache entry {} ({} bytes) exceeds cache capacity ({} bytes), evicting everything else",
                key, size, self.capacity
            );
        }

        let evicted = inner.evict_to(self.capacity, Some(&key));
        self.discard(evicted).await;
        metrics::gauge!("s3cache_cache_resident_bytes").set(inner.resident_bytes as f64);

        debug!("Cached entry {} ({} bytes)", key, size);

        match written {
            Some(Err(source)) => Err(CacheError::Persistence { key, source }),
            _ => Ok(()),
        }
    }

    async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: inner.lru.len() as u64,
            resident_bytes: inner.resident_bytes,
            capacity: self.capacity,
        }
    }
}
