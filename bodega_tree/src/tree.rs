//! Leaf writes and the revision lifecycle of ancestor directories.
//!
//! Every visible change to a document bumps the revision of each
//! directory on the path up to the root. Deletes run the inverse
//! cascade: a directory that lost its last entry disappears, one that
//! keeps entries gets a fresh revision.

use std::sync::Arc;

use bodega_core::{
    CascadeLevel, CascadeWave, DeleteCommit, DirRecord, IndexStore, MetaRecord, Result,
    WriteCommit, etag, paths,
};

/// Result of committing one leaf write.
#[derive(Debug, Clone)]
pub struct LeafWrite {
    /// False when the new record is observably identical to the prior
    /// one, in which case ancestors keep their revisions.
    pub changed: bool,
    pub prior: Option<MetaRecord>,
}

/// Tree-shaped view over the index store.
#[derive(Debug, Clone)]
pub struct TreeIndex {
    index: Arc<dyn IndexStore>,
}

impl TreeIndex {
    pub fn new(index: Arc<dyn IndexStore>) -> TreeIndex {
        TreeIndex { index }
    }

    pub async fn read_metadata(&self, user: &str, path: &str) -> Result<Option<MetaRecord>> {
        self.index.read_meta(user, path).await
    }

    pub async fn read_directory(&self, user: &str, dir: &str) -> Result<Option<DirRecord>> {
        self.index.read_dir(user, dir).await
    }

    /// Commits `record` for document `key` inside `directory`.
    pub async fn put_metadata(
        &self,
        user: &str,
        directory: &str,
        key: &str,
        record: MetaRecord,
    ) -> Result<LeafWrite> {
        let prior = self
            .index
            .commit_write(
                user,
                WriteCommit {
                    directory: directory.to_string(),
                    key: key.to_string(),
                    record: record.clone(),
                },
            )
            .await?;
        let changed = prior
            .as_ref()
            .is_none_or(|prior| prior.visibly_differs_from(&record));
        Ok(LeafWrite { changed, prior })
    }

    /// Refreshes the revision of `directory` and every ancestor up to
    /// the root, linking each level into its parent on the way.
    pub async fn propagate(
        &self,
        user: &str,
        directory: &str,
        modified: i64,
        checksum: &str,
    ) -> Result<()> {
        for dir in std::iter::once(directory).chain(paths::ancestor_chain(directory)) {
            let record = DirRecord {
                etag: etag::directory(dir, modified, Some(checksum)),
                modified,
            };
            self.index.write_dir(user, dir, record).await?;
            if !dir.is_empty() {
                self.index
                    .link_child(user, paths::parent_of(dir), paths::leaf_name(dir))
                    .await?;
            }
        }
        Ok(())
    }

    /// Removes the record for document `key` inside `directory`.
    /// Returns the removed record, or `None` when nothing was stored.
    pub async fn delete_metadata(
        &self,
        user: &str,
        directory: &str,
        key: &str,
    ) -> Result<Option<MetaRecord>> {
        self.index
            .commit_delete(
                user,
                DeleteCommit {
                    directory: directory.to_string(),
                    key: key.to_string(),
                },
            )
            .await
    }

    /// Applies the post-delete cascade from `directory` to the root:
    /// emptied levels vanish, surviving ones get a fresh revision. The
    /// root is refreshed but never removed.
    pub async fn delete_or_update_ancestors(
        &self,
        user: &str,
        directory: &str,
        modified: i64,
    ) -> Result<()> {
        let levels = std::iter::once(directory)
            .chain(paths::ancestor_chain(directory))
            .map(|dir| CascadeLevel {
                dir: dir.to_string(),
                refresh: DirRecord {
                    etag: etag::directory(dir, modified, None),
                    modified,
                },
            })
            .collect();
        self.index
            .cascade_delete(user, CascadeWave { levels })
            .await
    }
}
