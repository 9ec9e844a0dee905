use std::collections::BTreeMap;

use bodega_core::{
    AdapterFeatures, BlobAdapter, BlobHead, BlobObject, BlobReceipt, ChildStat, Result,
};
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Stored {
    body: Bytes,
    content_type: String,
    modified: i64,
}

#[derive(Debug)]
pub struct MemoryStore {
    blobs: DashMap<String, Stored>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BlobAdapter for MemoryStore {
    /// Returns the features supported by this store.
    fn features(&self) -> AdapterFeatures {
        AdapterFeatures {
            supplies_etag: false,
            derives_listings: true,
        }
    }

    /// Stores a body at the given path, replacing any previous blob.
    async fn store(&self, path: &str, body: Bytes, content_type: &str) -> Result<BlobReceipt> {
        let modified = Utc::now().timestamp_millis();
        self.blobs.insert(
            path.to_string(),
            Stored {
                body,
                content_type: content_type.to_string(),
                modified,
            },
        );
        Ok(BlobReceipt {
            etag: None,
            modified,
        })
    }

    /// Returns the blob stored at the given path.
    async fn fetch(&self, path: &str) -> Result<Option<BlobObject>> {
        Ok(self.blobs.get(path).map(|stored| BlobObject {
            body: stored.body.clone(),
            content_type: stored.content_type.clone(),
            etag: None,
            modified: stored.modified,
        }))
    }

    /// Deletes the blob at the given path.
    async fn remove(&self, path: &str) -> Result<bool> {
        Ok(self.blobs.remove(path).is_some())
    }

    /// Returns the stored attributes of the blob at the given path.
    async fn head(&self, path: &str) -> Result<Option<BlobHead>> {
        Ok(self.blobs.get(path).map(|stored| BlobHead {
            etag: None,
            content_type: stored.content_type.clone(),
            size: stored.body.len() as u64,
            modified: stored.modified,
        }))
    }

    /// Scans keys under the prefix; deeper keys fold into one directory
    /// entry per first segment.
    async fn list_children(&self, path: &str) -> Result<Vec<ChildStat>> {
        let mut entries: BTreeMap<String, ChildStat> = BTreeMap::new();
        for item in self.blobs.iter() {
            let Some(rest) = item.key().strip_prefix(path) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((first, _)) => {
                    let name = format!("{first}/");
                    entries.entry(name.clone()).or_insert(ChildStat {
                        name,
                        etag: None,
                        content_type: None,
                        size: None,
                        modified: None,
                    });
                }
                None => {
                    let stored = item.value();
                    entries.insert(
                        rest.to_string(),
                        ChildStat {
                            name: rest.to_string(),
                            etag: None,
                            content_type: Some(stored.content_type.clone()),
                            size: Some(stored.body.len() as u64),
                            modified: Some(stored.modified),
                        },
                    );
                }
            }
        }
        Ok(entries.into_values().collect())
    }
}
