//! `object_store` backed blob store
//!
//! Uses the `object_store` crate to reach AWS S3, MinIO and other
//! S3-compatible services. A local directory tree (one directory per
//! bucket) and an in-memory store are available for development and tests.
//!
//! `object_store` clients are bound to a single bucket, so one client is
//! built lazily per bucket name and reused for later requests. Bucket names
//! come from request paths, so connected clients are kept in a bounded LRU
//! map. In-memory buckets only exist once created with
//! [`ObjectStoreBackend::create_bucket`].

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use lru::LruCache;
use object_store::ObjectStore;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{BlobStore, DELIMITER, ListedObject, Listing};
use crate::error::StorageError;

/// S3 connection settings
///
/// Anything left unset falls back to the standard `AWS_*` environment
/// variables, so instance credentials and profiles keep working.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 region (e.g., "us-east-1")
    #[serde(default)]
    pub region: Option<String>,
    /// S3 endpoint URL (for MinIO or other S3-compatible services)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// AWS access key ID
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// AWS secret access key
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Allow HTTP (not HTTPS) connections
    #[serde(default)]
    pub allow_http: bool,
}

/// Which kind of store the buckets live in
#[derive(Debug, Clone)]
pub enum BackendKind {
    S3(S3Config),
    /// `<root>/<bucket>/<key>` on the local filesystem
    Local(PathBuf),
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::S3(_) => "s3",
            BackendKind::Local(_) => "local",
            BackendKind::Memory => "memory",
        }
    }
}

/// Default number of connected bucket clients kept around
pub const DEFAULT_CLIENT_CAPACITY: usize = 256;

/// Blob store over `object_store` clients, one per bucket
pub struct ObjectStoreBackend {
    kind: BackendKind,
    /// Connected S3 and local clients, least recently used dropped first
    clients: Mutex<LruCache<String, Arc<dyn ObjectStore>>>,
    /// In-memory buckets; never evicted since they hold the data
    created: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self::with_client_capacity(kind, DEFAULT_CLIENT_CAPACITY)
    }

    /// Create a backend keeping at most `capacity` connected clients
    pub fn with_client_capacity(kind: BackendKind, capacity: usize) -> Self {
        info!(
            "Initialized {} object store backend (client capacity: {})",
            kind.as_str(),
            capacity
        );

        Self {
            kind,
            clients: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            created: RwLock::new(HashMap::new()),
        }
    }

    pub fn s3(config: S3Config) -> Self {
        Self::new(BackendKind::S3(config))
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::new(BackendKind::Local(root.into()))
    }

    pub fn memory() -> Self {
        Self::new(BackendKind::Memory)
    }

    /// Create an empty in-memory bucket, or return the existing one
    pub fn create_bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if !matches!(self.kind, BackendKind::Memory) {
            return Err(StorageError::Configuration(format!(
                "Buckets can only be created in the memory backend, not {}",
                self.kind.as_str()
            )));
        }
        validate_bucket_name(name)?;

        let mut created = self.created.write();
        let store = created
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()));
        Ok(store.clone())
    }

    /// Get the client for a bucket, connecting it on first use
    pub fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        if let Some(store) = self.created.read().get(name) {
            return Ok(store.clone());
        }
        if let Some(store) = self.clients.lock().get(name) {
            return Ok(store.clone());
        }

        validate_bucket_name(name)?;
        let store = self.connect(name)?;

        // Another request may have connected the same bucket meanwhile; keep the first.
        let mut clients = self.clients.lock();
        Ok(clients.get_or_insert(name.to_string(), || store).clone())
    }

    /// Number of bucket clients currently held
    pub fn client_count(&self) -> usize {
        self.clients.lock().len() + self.created.read().len()
    }

    fn connect(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        match &self.kind {
            BackendKind::S3(config) => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }

                // Set endpoint for MinIO or other S3-compatible services
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }

                if let Some(access_key) = &config.access_key_id {
                    builder = builder.with_access_key_id(access_key);
                }
                if let Some(secret_key) = &config.secret_access_key {
                    builder = builder.with_secret_access_key(secret_key);
                }

                if config.allow_http {
                    builder = builder.with_allow_http(true);
                }

                let store = builder.build().map_err(|e| {
                    StorageError::Configuration(format!(
                        "Failed to create S3 client for bucket {}: {}",
                        bucket, e
                    ))
                })?;

                info!(
                    "Connected S3 bucket: bucket={}, region={:?}, endpoint={:?}",
                    bucket, config.region, config.endpoint
                );
                Ok(Arc::new(store))
            }
            BackendKind::Local(root) => {
                let path = root.join(bucket);
                if !path.is_dir() {
                    return Err(StorageError::NotFound(format!(
                        "The specified bucket does not exist: {}",
                        bucket
                    )));
                }

                let store = LocalFileSystem::new_with_prefix(&path)?;
                info!("Connected local bucket {} at {:?}", bucket, path);
                Ok(Arc::new(store))
            }
            BackendKind::Memory => Err(StorageError::NotFound(format!(
                "The specified bucket does not exist: {}",
                bucket
            ))),
        }
    }
}

/// Reject bucket names that could never address a real bucket
///
/// Also keeps `..` and friends from walking out of a local root.
fn validate_bucket_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StorageError::NotFound(format!(
            "The specified bucket is not valid: {}",
            name
        )));
    }
    Ok(())
}

fn object_path(key: &str) -> Result<ObjectPath, StorageError> {
    ObjectPath::parse(key)
        .map_err(|e| StorageError::Backend(format!("Invalid object key {}: {}", key, e)))
}

fn record_backend_call<T>(operation: &'static str, result: &Result<T, StorageError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(
        "s3cache_backend_requests_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

#[async_trait]
impl BlobStore for ObjectStoreBackend {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        debug!("Fetching object from backend: {}/{}", bucket, key);

        let result = async {
            if key.is_empty() {
                return Err(StorageError::NotFound(
                    "The specified key does not exist".to_string(),
                ));
            }
            let store = self.bucket(bucket)?;
            let path = object_path(key)?;
            let data = store.get(&path).await?.bytes().await?;
            Ok::<_, StorageError>(data)
        }
        .await;

        record_backend_call("get_object", &result);
        result
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Listing, StorageError> {
        debug!("Listing backend prefix: {}/{}", bucket, prefix);

        if delimiter != DELIMITER {
            return Err(StorageError::Configuration(format!(
                "Unsupported listing delimiter: {:?}",
                delimiter
            )));
        }

        let result = async {
            let store = self.bucket(bucket)?;

            // object_store treats the prefix as a directory, so "sub/" and "sub" list the same
            let prefix_path = match prefix.trim_matches('/') {
                "" => None,
                trimmed => Some(object_path(trimmed)?),
            };

            let listed = store.list_with_delimiter(prefix_path.as_ref()).await?;

            Ok::<_, StorageError>(Listing {
                objects: listed
                    .objects
                    .into_iter()
                    .map(|meta| ListedObject {
                        key: meta.location.to_string(),
                        size: meta.size as u64,
                    })
                    .collect(),
                common_prefixes: listed
                    .common_prefixes
                    .into_iter()
                    .map(|p| format!("{}{}", p, DELIMITER))
                    .collect(),
            })
        }
        .await;

        record_backend_call("list_objects", &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::PutPayload;

    async fn seeded_backend() -> ObjectStoreBackend {
        let backend = ObjectStoreBackend::memory();
        let store = backend.create_bucket("pkgs").unwrap();
        for key in ["sub/a.txt", "sub/b.txt", "sub/deep/c.txt", "top.txt"] {
            store
                .put(
                    &ObjectPath::parse(key).unwrap(),
                    PutPayload::from(Bytes::from(format!("contents of {}", key))),
                )
                .await
                .unwrap();
        }
        backend
    }

    #[tokio::test]
    async fn test_get_object() {
        let backend = seeded_backend().await;

        let data = backend.get_object("pkgs", "sub/a.txt").await.unwrap();
        assert_eq!(data, Bytes::from("contents of sub/a.txt"));
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let backend = seeded_backend().await;

        let err = backend.get_object("pkgs", "nope.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_empty_key() {
        let backend = seeded_backend().await;

        let err = backend.get_object("pkgs", "").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let backend = seeded_backend().await;

        let err = backend.get_object("other", "top.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_objects_with_delimiter() {
        let backend = seeded_backend().await;

        let listing = backend.list_objects("pkgs", "sub/", "/").await.unwrap();
        let keys: Vec<&str> = listing.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["sub/a.txt", "sub/b.txt"]);
        assert_eq!(listing.common_prefixes, vec!["sub/deep/".to_string()]);
        assert_eq!(listing.objects[0].size, "contents of sub/a.txt".len() as u64);
    }

    #[tokio::test]
    async fn test_list_bucket_root() {
        let backend = seeded_backend().await;

        let listing = backend.list_objects("pkgs", "", "/").await.unwrap();
        let keys: Vec<&str> = listing.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["top.txt"]);
        assert_eq!(listing.common_prefixes, vec!["sub/".to_string()]);
    }

    #[tokio::test]
    async fn test_list_empty_prefix() {
        let backend = seeded_backend().await;

        let listing = backend.list_objects("pkgs", "missing/", "/").await.unwrap();
        assert_eq!(listing, Listing::default());
    }

    #[tokio::test]
    async fn test_unsupported_delimiter() {
        let backend = seeded_backend().await;

        let err = backend.list_objects("pkgs", "sub/", ":").await.unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_invalid_bucket_names() {
        let backend = ObjectStoreBackend::memory();

        for name in ["", ".", ".."] {
            let err = backend.get_object(name, "x").await.unwrap_err();
            assert!(err.is_not_found(), "bucket {:?} should be rejected", name);
        }
    }

    #[tokio::test]
    async fn test_unknown_memory_buckets_are_not_created() {
        let backend = seeded_backend().await;

        for i in 0..5000 {
            let err = backend
                .get_object(&format!("bucket-{}", i), "x")
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }

        assert_eq!(backend.client_count(), 1);
        assert!(backend.get_object("pkgs", "top.txt").await.is_ok());
    }

    #[test]
    fn test_create_bucket_is_idempotent() {
        let backend = ObjectStoreBackend::memory();

        let first = backend.create_bucket("pkgs").unwrap();
        let second = backend.create_bucket("pkgs").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(backend.create_bucket("..").is_err());
        assert!(ObjectStoreBackend::local("/tmp").create_bucket("pkgs").is_err());
    }

    #[test]
    fn test_s3_clients_are_bounded() {
        let backend = ObjectStoreBackend::with_client_capacity(
            BackendKind::S3(S3Config {
                region: Some("us-east-1".to_string()),
                endpoint: Some("http://localhost:9000".to_string()),
                access_key_id: Some("test".to_string()),
                secret_access_key: Some("test".to_string()),
                allow_http: true,
            }),
            8,
        );

        // Building a client does no network IO
        let first = backend.bucket("bucket-0").unwrap();
        for i in 1..100 {
            backend.bucket(&format!("bucket-{}", i)).unwrap();
        }
        assert_eq!(backend.client_count(), 8);

        // The recently used client is reused, the evicted one rebuilt
        let recent = backend.bucket("bucket-99").unwrap();
        assert!(Arc::ptr_eq(&recent, &backend.bucket("bucket-99").unwrap()));
        assert!(!Arc::ptr_eq(&first, &backend.bucket("bucket-0").unwrap()));
        assert_eq!(backend.client_count(), 8);
    }

    #[tokio::test]
    async fn test_local_backend() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("pkgs/sub")).unwrap();
        std::fs::write(root.path().join("pkgs/sub/a.txt"), b"local data").unwrap();

        let backend = ObjectStoreBackend::local(root.path());

        let data = backend.get_object("pkgs", "sub/a.txt").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"local data"));

        let listing = backend.list_objects("pkgs", "sub/", "/").await.unwrap();
        assert_eq!(listing.objects.len(), 1);
        assert_eq!(listing.objects[0].key, "sub/a.txt");

        let err = backend.get_object("missing", "a.txt").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(backend.client_count(), 1);
    }
}
