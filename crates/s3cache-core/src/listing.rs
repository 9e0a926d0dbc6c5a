//! Directory index synthesis
//!
//! Object stores have no directories. A prefix listing with a `/`
//! delimiter is turned into a minimal HTML page that package installers
//! such as pip can browse.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use s3cache_storage::{BlobStore, DELIMITER, StorageError};
use std::sync::Arc;
use tracing::debug;

/// Lazily produced response body
pub type ByteStream = BoxStream<'static, Bytes>;

const INDEX_HEAD: &str = "<html><head><title>Package Index</title></head><body>";
const INDEX_TAIL: &str = "</body></html>";

/// One link on an index page, relative to the listed prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub name: String,
    pub uri: String,
}

/// Builds index pages from backend listings
pub struct ListingSynthesizer {
    store: Arc<dyn BlobStore>,
}

impl ListingSynthesizer {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// List the direct children of `prefix`
    ///
    /// Files come first, then subdirectories, each in backend order.
    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ListingItem>, StorageError> {
        let listing = self.store.list_objects(bucket, prefix, DELIMITER).await?;
        debug!(
            "Listed {}/{}: {} objects, {} prefixes",
            bucket,
            prefix,
            listing.objects.len(),
            listing.common_prefixes.len()
        );

        let files = listing.objects.into_iter().filter_map(|object| {
            let relative = object.key.strip_prefix(prefix)?;
            // A directory marker object has the prefix as its whole key
            (!relative.is_empty()).then(|| ListingItem {
                name: relative.to_string(),
                uri: relative.to_string(),
            })
        });

        let subdirectories = listing.common_prefixes.into_iter().filter_map(|common| {
            let relative = common.strip_prefix(prefix)?;
            let name = relative.strip_suffix(DELIMITER).unwrap_or(relative);
            (!name.is_empty()).then(|| ListingItem {
                name: name.to_string(),
                uri: relative.to_string(),
            })
        });

        Ok(files.chain(subdirectories).collect())
    }

    /// Render an index page as a stream of chunks: head, one line per item, tail
    pub fn render(items: Vec<ListingItem>) -> ByteStream {
        let lines = items.into_iter().map(|item| {
            Bytes::from(format!(
                "<a href=\"{}\">{}</a><br/>",
                escape_html(&item.uri),
                escape_html(&item.name)
            ))
        });

        stream::once(async { Bytes::from_static(INDEX_HEAD.as_bytes()) })
            .chain(stream::iter(lines))
            .chain(stream::once(async { Bytes::from_static(INDEX_TAIL.as_bytes()) }))
            .boxed()
    }
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3cache_storage::{ListedObject, Listing};

    use crate::fetcher::tests::StubStore;

    fn object(key: &str) -> ListedObject {
        ListedObject {
            key: key.to_string(),
            size: 1,
        }
    }

    fn item(name: &str, uri: &str) -> ListingItem {
        ListingItem {
            name: name.to_string(),
            uri: uri.to_string(),
        }
    }

    async fn collect(body: ByteStream) -> Vec<Bytes> {
        body.collect().await
    }

    #[tokio::test]
    async fn test_list_strips_prefix() {
        let store = StubStore::default().with_listing(
            "pkgs",
            "sub/",
            Listing {
                objects: vec![object("sub/b.txt"), object("sub/a.txt")],
                common_prefixes: vec!["sub/deep/".to_string()],
            },
        );
        let synthesizer = ListingSynthesizer::new(Arc::new(store));

        let items = synthesizer.list("pkgs", "sub/").await.unwrap();
        assert_eq!(
            items,
            vec![
                item("b.txt", "b.txt"),
                item("a.txt", "a.txt"),
                item("deep", "deep/"),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_skips_directory_marker() {
        let store = StubStore::default().with_listing(
            "pkgs",
            "sub/",
            Listing {
                objects: vec![object("sub/"), object("sub/a.txt")],
                common_prefixes: vec![],
            },
        );
        let synthesizer = ListingSynthesizer::new(Arc::new(store));

        let items = synthesizer.list("pkgs", "sub/").await.unwrap();
        assert_eq!(items, vec![item("a.txt", "a.txt")]);
    }

    #[tokio::test]
    async fn test_list_bucket_root() {
        let store = StubStore::default().with_listing(
            "pkgs",
            "",
            Listing {
                objects: vec![object("top.txt")],
                common_prefixes: vec!["sub/".to_string()],
            },
        );
        let synthesizer = ListingSynthesizer::new(Arc::new(store));

        let items = synthesizer.list("pkgs", "").await.unwrap();
        assert_eq!(items, vec![item("top.txt", "top.txt"), item("sub", "sub/")]);
    }

    #[tokio::test]
    async fn test_list_error_propagates() {
        let synthesizer = ListingSynthesizer::new(Arc::new(StubStore::default()));

        let err = synthesizer.list("denied", "sub/").await.unwrap_err();
        assert!(matches!(err, StorageError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_render_chunks_in_order() {
        let chunks = collect(ListingSynthesizer::render(vec![
            item("a.txt", "a.txt"),
            item("deep", "deep/"),
        ]))
        .await;

        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(INDEX_HEAD.as_bytes()),
                Bytes::from_static(b"<a href=\"a.txt\">a.txt</a><br/>"),
                Bytes::from_static(b"<a href=\"deep/\">deep</a><br/>"),
                Bytes::from_static(INDEX_TAIL.as_bytes()),
            ]
        );
    }

    #[tokio::test]
    async fn test_render_empty_listing() {
        let chunks = collect(ListingSynthesizer::render(Vec::new())).await;
        assert_eq!(chunks.concat(), format!("{}{}", INDEX_HEAD, INDEX_TAIL).into_bytes());
    }

    #[tokio::test]
    async fn test_render_escapes_names() {
        let chunks = collect(ListingSynthesizer::render(vec![item("a<b>&\"c\".txt", "a<b>&\"c\".txt")])).await;
        assert_eq!(
            chunks[1],
            Bytes::from_static(
                b"<a href=\"a&lt;b&gt;&amp;&quot;c&quot;.txt\">a&lt;b&gt;&amp;&quot;c&quot;.txt</a><br/>"
            )
        );
    }
}
