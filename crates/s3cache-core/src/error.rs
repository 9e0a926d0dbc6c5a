//! Core error types

use thiserror::Error;

use crate::cache::CacheKey;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The backend refused or failed the request; the storage error kind is kept
    #[error("Backend error: {0}")]
    Backend(#[from] s3cache_storage::StorageError),
}

impl CoreError {
    /// Message rendered into the response body
    pub fn message(&self) -> String {
        match self {
            CoreError::Backend(e) => e.message(),
        }
    }
}

/// Errors from cache operations
///
/// None of these ever fail a request: the bytes are already in hand when
/// the cache is written.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to prepare cache directory {path:?}: {source}")]
    Directory {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist cache entry {key}: {source}")]
    Persistence {
        key: CacheKey,
        #[source]
        source: std::io::Error,
    },
}
