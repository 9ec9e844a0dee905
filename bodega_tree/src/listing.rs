//! Directory listing assembly.
//!
//! A listing is rendered from one atomic snapshot of the directory, so
//! concurrent writes can never produce a row whose attributes mix two
//! revisions.

use std::collections::BTreeMap;
use std::sync::Arc;

use bodega_core::{ChildRecord, Error, IndexStore, Result, etag};
use serde::Serialize;

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    #[serde(rename = "ETag")]
    pub etag: String,
    /// Documents only; directories carry no media type.
    #[serde(rename = "Content-Type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "Content-Length", skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

/// An assembled directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Revision tag of the directory itself.
    pub etag: String,
    /// Entries keyed by name; directories keep their trailing slash.
    pub items: BTreeMap<String, ListingEntry>,
}

impl Listing {
    /// Renders the entry map as a JSON document body.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.items).map_err(Error::backend)
    }
}

#[derive(Debug, Clone)]
pub struct ListingAssembler {
    index: Arc<dyn IndexStore>,
}

impl ListingAssembler {
    pub fn new(index: Arc<dyn IndexStore>) -> ListingAssembler {
        ListingAssembler { index }
    }

    /// Assembles the listing for `directory`. A directory that was never
    /// written lists as empty under a synthetic revision tag, so clients
    /// can still revalidate against it.
    pub async fn list(&self, user: &str, directory: &str) -> Result<Listing> {
        let snapshot = self.index.listing_snapshot(user, directory).await?;
        let etag = match &snapshot.dir {
            Some(dir) => dir.etag.clone(),
            None => etag::synthetic(user, directory),
        };

        let mut items = BTreeMap::new();
        for (name, record) in snapshot.entries {
            let entry = match record {
                ChildRecord::Document(meta) => ListingEntry {
                    etag: meta.etag,
                    content_type: Some(meta.content_type),
                    content_length: Some(meta.size),
                },
                ChildRecord::Directory(dir) => ListingEntry {
                    etag: dir.etag,
                    content_type: None,
                    content_length: None,
                },
            };
            items.insert(name, entry);
        }
        Ok(Listing { etag, items })
    }
}
