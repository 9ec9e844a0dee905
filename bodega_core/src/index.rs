//! Index store contract.
//!
//! An [`IndexStore`] persists the per-user directory tree: document
//! metadata, directory revisions, children sets, quota counters and
//! token grants. The trait has two kinds of methods:
//!
//! - *Point primitives* touch a single key and carry no atomicity
//!   requirements beyond themselves.
//! - *Compound steps* (`check_collision`, `commit_write`,
//!   `commit_delete`, `cascade_delete`, `listing_snapshot`) must each
//!   run against one consistent state. Their logic lives exactly once,
//!   in [`script`]; a backend only supplies the atomic context (a lock
//!   guard, a transaction) and delegates.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::paths;
use crate::record::{DirRecord, MetaRecord};

pub mod script;

/// Inputs for one collision walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionProbe {
    /// Directory path that would shadow the new document outright.
    pub dir_probe: String,
    /// Directories to inspect, deepest first, ending at the root.
    pub walk: Vec<String>,
}

impl CollisionProbe {
    /// Probe for writing document `key` inside `directory`.
    pub fn for_write(directory: &str, key: &str) -> CollisionProbe {
        let mut walk = vec![directory.to_string()];
        walk.extend(
            paths::ancestor_chain(directory)
                .into_iter()
                .map(str::to_string),
        );
        CollisionProbe {
            dir_probe: format!("{directory}{key}/"),
            walk,
        }
    }
}

/// One leaf write to commit atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommit {
    pub directory: String,
    pub key: String,
    pub record: MetaRecord,
}

/// One leaf removal to commit atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCommit {
    pub directory: String,
    pub key: String,
}

/// Precomputed refresh for one directory level of a delete cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeLevel {
    pub dir: String,
    /// Record to store when the directory keeps other entries.
    pub refresh: DirRecord,
}

/// A full delete cascade, deepest level first, root last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeWave {
    pub levels: Vec<CascadeLevel>,
}

/// Record of one directory entry in a listing snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildRecord {
    Document(MetaRecord),
    Directory(DirRecord),
}

/// Consistent snapshot of one directory for listing assembly.
#[derive(Debug, Clone, Default)]
pub struct ListingSnapshot {
    /// The directory's own record; `None` when it was never written.
    pub dir: Option<DirRecord>,
    /// Entries in name order; directories keep their trailing slash.
    pub entries: Vec<(String, ChildRecord)>,
}

/// Metadata backend for the per-user directory tree.
#[async_trait]
pub trait IndexStore: std::fmt::Debug + Send + Sync {
    // --- point primitives ---

    async fn read_meta(&self, user: &str, path: &str) -> Result<Option<MetaRecord>>;

    async fn read_dir(&self, user: &str, dir: &str) -> Result<Option<DirRecord>>;

    async fn write_dir(&self, user: &str, dir: &str, record: DirRecord) -> Result<()>;

    async fn read_children(&self, user: &str, dir: &str) -> Result<BTreeSet<String>>;

    /// Adds `name` to `dir`'s children set. Idempotent.
    async fn link_child(&self, user: &str, dir: &str, name: &str) -> Result<()>;

    /// Current usage total in bytes.
    async fn read_quota(&self, user: &str) -> Result<i64>;

    /// Applies a usage delta and returns the new total.
    async fn adjust_quota(&self, user: &str, delta: i64) -> Result<i64>;

    /// Raw `scope:permission` strings granted to a token.
    async fn read_scopes(&self, user: &str, token: &str) -> Result<BTreeSet<String>>;

    async fn write_scopes(&self, user: &str, token: &str, scopes: BTreeSet<String>) -> Result<()>;

    // --- atomic compound steps (logic in `script`) ---

    /// Runs the collision walk against one consistent state.
    async fn check_collision(&self, user: &str, probe: CollisionProbe) -> Result<bool>;

    /// Commits one leaf write. Returns the record it replaced.
    async fn commit_write(&self, user: &str, commit: WriteCommit) -> Result<Option<MetaRecord>>;

    /// Commits one leaf removal. Returns the removed record, or `None`
    /// when nothing was stored.
    async fn commit_delete(&self, user: &str, removal: DeleteCommit) -> Result<Option<MetaRecord>>;

    /// Applies one delete cascade as a single atomic unit.
    async fn cascade_delete(&self, user: &str, wave: CascadeWave) -> Result<()>;

    /// Reads one directory and all of its entry records atomically.
    async fn listing_snapshot(&self, user: &str, dir: &str) -> Result<ListingSnapshot>;
}
