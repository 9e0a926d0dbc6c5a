//! Blob store trait

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Delimiter used to emulate directories in a flat key namespace
pub const DELIMITER: &str = "/";

/// A single object returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// Full object key, including the queried prefix
    pub key: String,
    pub size: u64,
}

/// Fully assembled result of a delimited listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Objects directly under the prefix
    pub objects: Vec<ListedObject>,
    /// Groupings one level deeper, each ending with the delimiter
    pub common_prefixes: Vec<String>,
}

/// Blob store trait
///
/// Implementations provide read access to objects addressed by
/// `(bucket, key)` and delimited prefix listings. Pagination, if the
/// backend has any, is handled inside the implementation.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read an object fully into memory
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// List the objects and common prefixes directly under `prefix`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Listing, StorageError>;
}
