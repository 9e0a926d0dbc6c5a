//! s3cache core logic
//!
//! This crate provides the caching layer of the proxy: the LRU cache store,
//! read-through object fetching, directory index synthesis and request
//! routing.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod listing;
pub mod policy;
pub mod router;

pub use cache::{
    build_cache, CacheConfig, CacheKey, CacheStats, CacheStore, LruCacheStore, NoopCache,
};
pub use error::{CacheError, CoreError};
pub use fetcher::ObjectFetcher;
pub use listing::{ByteStream, ListingItem, ListingSynthesizer};
pub use policy::DirectoryPolicy;
pub use router::{ProxyRequest, ProxyResponse, ProxyService, ResponseBody};
