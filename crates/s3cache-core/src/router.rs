//! Request routing and translation
//!
//! Turns a request path into a backend operation and maps the outcome to a
//! status, content type and body. Kept free of any HTTP server types so the
//! whole state machine can be exercised directly.

use bytes::Bytes;
use futures::StreamExt;
use http::StatusCode;
use s3cache_storage::{BlobStore, DELIMITER};
use std::sync::Arc;
use tracing::debug;

use crate::cache::CacheStore;
use crate::error::CoreError;
use crate::fetcher::ObjectFetcher;
use crate::listing::{ByteStream, ListingSynthesizer};
use crate::policy::DirectoryPolicy;

/// Body of the root path
pub const BANNER: &str = "Caching S3 Proxy";

/// Body returned when the path names no bucket
pub const NO_BUCKET: &str = "No bucket specified";

/// Object fetched for directory paths under [`DirectoryPolicy::IndexFile`]
pub const INDEX_DOCUMENT: &str = "index.html";

pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html";

/// What a request path asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRequest<'a> {
    Root,
    NoBucket,
    /// Key ends with the delimiter
    Directory { bucket: &'a str, prefix: &'a str },
    Object { bucket: &'a str, key: &'a str },
}

impl<'a> ProxyRequest<'a> {
    /// Classify a slash-delimited path, already percent-decoded
    pub fn parse(path: &'a str) -> Self {
        if path.is_empty() || path == "/" {
            return ProxyRequest::Root;
        }

        let Some((bucket, key)) = path.trim_start_matches('/').split_once('/') else {
            return ProxyRequest::NoBucket;
        };

        // An empty key (`/bucket/`) is an object request, which the backend rejects
        if key.ends_with(DELIMITER) {
            ProxyRequest::Directory {
                bucket,
                prefix: key,
            }
        } else {
            ProxyRequest::Object { bucket, key }
        }
    }
}

/// Response body, either in hand or produced chunk by chunk
pub enum ResponseBody {
    Full(Bytes),
    Stream(ByteStream),
}

impl ResponseBody {
    /// Drain the body into a single buffer
    pub async fn collect(self) -> Bytes {
        match self {
            ResponseBody::Full(data) => data,
            ResponseBody::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.collect().await;
                Bytes::from(chunks.concat())
            }
        }
    }
}

/// Outcome of a proxied request
pub struct ProxyResponse {
    pub status: StatusCode,
    /// `None` leaves the content type to the serving layer
    pub content_type: Option<&'static str>,
    pub body: ResponseBody,
}

impl ProxyResponse {
    fn text(status: StatusCode, message: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: Some(TEXT_PLAIN),
            body: ResponseBody::Full(message.into()),
        }
    }

    /// Backend failures all render as 404 with the backend's message
    fn backend_error(error: CoreError) -> Self {
        debug!("Backend error: {}", error);
        Self::text(StatusCode::NOT_FOUND, error.message())
    }
}

/// Proxy service answering requests from the cache and the backend
pub struct ProxyService {
    fetcher: ObjectFetcher,
    listings: ListingSynthesizer,
    directory_policy: DirectoryPolicy,
}

impl ProxyService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        store: Arc<dyn BlobStore>,
        directory_policy: DirectoryPolicy,
    ) -> Self {
        Self {
            fetcher: ObjectFetcher::new(cache, store.clone()),
            listings: ListingSynthesizer::new(store),
            directory_policy,
        }
    }

    pub fn fetcher(&self) -> &ObjectFetcher {
        &self.fetcher
    }

    pub fn directory_policy(&self) -> DirectoryPolicy {
        self.directory_policy
    }

    /// Answer a request for `path`
    pub async fn handle(&self, path: &str) -> ProxyResponse {
        match ProxyRequest::parse(path) {
            ProxyRequest::Root => ProxyResponse::text(StatusCode::OK, BANNER),
            ProxyRequest::NoBucket => ProxyResponse {
                status: StatusCode::NOT_FOUND,
                content_type: None,
                body: ResponseBody::Full(Bytes::from_static(NO_BUCKET.as_bytes())),
            },
            ProxyRequest::Directory { bucket, prefix } => match self.directory_policy {
                DirectoryPolicy::Synthesize => self.synthesize_index(bucket, prefix).await,
                DirectoryPolicy::IndexFile => self.serve_index_file(bucket, prefix).await,
            },
            ProxyRequest::Object { bucket, key } => match self.fetcher.fetch(bucket, key).await {
                Ok(data) => ProxyResponse {
                    status: StatusCode::OK,
                    content_type: None,
                    body: ResponseBody::Full(data),
                },
                Err(e) => ProxyResponse::backend_error(e),
            },
        }
    }

    async fn synthesize_index(&self, bucket: &str, prefix: &str) -> ProxyResponse {
        debug!("Synthesizing index for {}/{}", bucket, prefix);

        match self.listings.list(bucket, prefix).await {
            Ok(items) => ProxyResponse {
                status: StatusCode::OK,
                content_type: Some(TEXT_HTML),
                body: ResponseBody::Stream(ListingSynthesizer::render(items)),
            },
            Err(e) => ProxyResponse::backend_error(CoreError::Backend(e)),
        }
    }

    async fn serve_index_file(&self, bucket: &str, prefix: &str) -> ProxyResponse {
        let key = format!("{}{}", prefix, INDEX_DOCUMENT);
        debug!("Serving index document {}/{}", bucket, key);

        match self.fetcher.fetch(bucket, &key).await {
            Ok(data) => ProxyResponse {
                status: StatusCode::OK,
                content_type: Some(TEXT_HTML),
                body: ResponseBody::Full(data),
            },
            Err(e) => ProxyResponse::backend_error(e),
        }
    }
}
