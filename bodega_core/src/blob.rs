//! Blob store adapter contract.
//!
//! Adapters persist raw document bodies addressed by tree path (already
//! namespaced per user by the engine). The index stays the source of
//! truth for metadata; an adapter only contributes a revision tag and a
//! timestamp when its backend tracks them natively.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Capability flags for a blob adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterFeatures {
    /// `store` returns the backend's own revision tag.
    pub supplies_etag: bool,
    /// The backend can enumerate direct children of a directory path.
    pub derives_listings: bool,
}

/// Receipt for one stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReceipt {
    /// Backend revision tag; `None` when the engine must derive one
    /// from the body checksum.
    pub etag: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub modified: i64,
}

/// A fetched blob with its stored attributes.
#[derive(Debug, Clone)]
pub struct BlobObject {
    pub body: Bytes,
    pub content_type: String,
    pub etag: Option<String>,
    pub modified: i64,
}

/// Stored attributes of a blob, without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHead {
    pub etag: Option<String>,
    pub content_type: String,
    pub size: u64,
    pub modified: i64,
}

/// One direct child of a directory path, as seen by the backend.
/// Attribute fields are best effort; backends report what they know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildStat {
    /// Entry name; directories keep their trailing slash.
    pub name: String,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub modified: Option<i64>,
}

/// Byte storage backend for document bodies.
#[async_trait]
pub trait BlobAdapter: std::fmt::Debug + Send + Sync {
    /// Capability flags for this adapter.
    fn features(&self) -> AdapterFeatures;

    /// Stores `body` at `path`, replacing any previous blob.
    async fn store(&self, path: &str, body: Bytes, content_type: &str) -> Result<BlobReceipt>;

    /// Fetches the blob at `path`.
    async fn fetch(&self, path: &str) -> Result<Option<BlobObject>>;

    /// Removes the blob at `path`. Returns false when nothing was stored.
    async fn remove(&self, path: &str) -> Result<bool>;

    /// Reads stored attributes without the body.
    async fn head(&self, path: &str) -> Result<Option<BlobHead>>;

    /// Enumerates the direct children under a directory path.
    async fn list_children(&self, path: &str) -> Result<Vec<ChildStat>>;
}
