//! s3cache storage layer
//!
//! This crate provides the blob store abstraction the proxy reads from,
//! with an implementation over S3-compatible, local and in-memory stores.

pub mod backend;
pub mod error;
pub mod store;

pub use backend::{BlobStore, DELIMITER, ListedObject, Listing};
pub use error::StorageError;
pub use store::{BackendKind, ObjectStoreBackend, S3Config};
