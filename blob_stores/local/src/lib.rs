use std::path::{Path, PathBuf};

use bodega_core::{
    AdapterFeatures, BlobAdapter, BlobHead, BlobObject, BlobReceipt, ChildStat, Error, Result,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalStoreConfig {
    pub base_path: String,
}

/// Stored attributes kept as a sidecar file under the `head` tree,
/// mirroring the blob's location under the `data` tree.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct HeadRecord {
    content_type: String,
    modified: i64,
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalStore {
            base_path: base_path.into(),
        }
    }

    pub fn create(config: LocalStoreConfig) -> Self {
        LocalStore {
            base_path: config.base_path.into(),
        }
    }

    fn resolve(&self, tree: &str, path: &str) -> Result<PathBuf> {
        if path.contains("..") || path.starts_with('/') {
            return Err(Error::UnsupportedRequest(format!(
                "invalid blob path '{path}', must be a relative path without '..'"
            )));
        }
        Ok(self.base_path.join(tree).join(path))
    }

    fn data_path(&self, path: &str) -> Result<PathBuf> {
        self.resolve("data", path)
    }

    fn head_path(&self, path: &str) -> Result<PathBuf> {
        self.resolve("head", path)
    }

    async fn read_head(&self, path: &str) -> Result<Option<HeadRecord>> {
        match tokio::fs::read(self.head_path(path)?).await {
            Ok(bytes) => Ok(Some(postcard::from_bytes(&bytes).map_err(Error::backend)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::backend(e)),
        }
    }
}

async fn file_modified_ms(path: &Path) -> Result<i64> {
    let metadata = tokio::fs::metadata(path).await.map_err(Error::backend)?;
    let modified = metadata.modified().map_err(Error::backend)?;
    Ok(DateTime::<Utc>::from(modified).timestamp_millis())
}

#[async_trait::async_trait]
impl BlobAdapter for LocalStore {
    /// Returns the features of this store.
    fn features(&self) -> AdapterFeatures {
        AdapterFeatures {
            supplies_etag: false,
            derives_listings: true,
        }
    }

    /// Writes the body and its head sidecar.
    async fn store(&self, path: &str, body: Bytes, content_type: &str) -> Result<BlobReceipt> {
        let data_path = self.data_path(path)?;
        let head_path = self.head_path(path)?;
        if let Some(parent) = data_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::backend)?;
        }
        if let Some(parent) = head_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::backend)?;
        }

        let modified = Utc::now().timestamp_millis();
        let head = HeadRecord {
            content_type: content_type.to_string(),
            modified,
        };
        let head_bytes = postcard::to_allocvec(&head).map_err(Error::backend)?;

        tokio::fs::write(&data_path, &body)
            .await
            .map_err(Error::backend)?;
        tokio::fs::write(&head_path, &head_bytes)
            .await
            .map_err(Error::backend)?;

        Ok(BlobReceipt {
            etag: None,
            modified,
        })
    }

    /// Reads the body back; blobs written by other tools get fallback
    /// attributes from filesystem metadata.
    async fn fetch(&self, path: &str) -> Result<Option<BlobObject>> {
        let data_path = self.data_path(path)?;
        let body = match tokio::fs::read(&data_path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::backend(e)),
        };

        let (content_type, modified) = match self.read_head(path).await? {
            Some(head) => (head.content_type, head.modified),
            None => (
                FALLBACK_CONTENT_TYPE.to_string(),
                file_modified_ms(&data_path).await?,
            ),
        };

        Ok(Some(BlobObject {
            body,
            content_type,
            etag: None,
            modified,
        }))
    }

    /// Deletes the blob and its head sidecar.
    async fn remove(&self, path: &str) -> Result<bool> {
        let data_path = self.data_path(path)?;
        let removed = match tokio::fs::metadata(&data_path).await {
            Ok(_metadata) => {
                tokio::fs::remove_file(&data_path)
                    .await
                    .map_err(Error::backend)?;
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(Error::backend(e)),
        };

        if removed {
            match tokio::fs::remove_file(self.head_path(path)?).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::backend(e)),
            }
        }
        Ok(removed)
    }

    async fn head(&self, path: &str) -> Result<Option<BlobHead>> {
        let data_path = self.data_path(path)?;
        let metadata = match tokio::fs::metadata(&data_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::backend(e)),
        };
        if metadata.is_dir() {
            return Ok(None);
        }

        let (content_type, modified) = match self.read_head(path).await? {
            Some(head) => (head.content_type, head.modified),
            None => {
                let modified = metadata.modified().map_err(Error::backend)?;
                (
                    FALLBACK_CONTENT_TYPE.to_string(),
                    DateTime::<Utc>::from(modified).timestamp_millis(),
                )
            }
        };

        Ok(Some(BlobHead {
            etag: None,
            content_type,
            size: metadata.len(),
            modified,
        }))
    }

    /// Reads one directory level of the data tree, sorted by name.
    async fn list_children(&self, path: &str) -> Result<Vec<ChildStat>> {
        let dir_path = self.data_path(path)?;
        let mut reader = match tokio::fs::read_dir(&dir_path).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::backend(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(Error::backend)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await.map_err(Error::backend)?;
            if file_type.is_dir() {
                entries.push(ChildStat {
                    name: format!("{name}/"),
                    etag: None,
                    content_type: None,
                    size: None,
                    modified: None,
                });
            } else {
                let metadata = entry.metadata().await.map_err(Error::backend)?;
                let head = self.read_head(&format!("{path}{name}")).await?;
                entries.push(ChildStat {
                    etag: None,
                    content_type: head.as_ref().map(|h| h.content_type.clone()),
                    size: Some(metadata.len()),
                    modified: head.as_ref().map(|h| h.modified),
                    name,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
