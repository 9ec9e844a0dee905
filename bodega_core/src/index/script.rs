//! Shared implementations of the compound [`IndexStore`] steps.
//!
//! A backend wraps whatever gives it a consistent view (a lock guard,
//! a transaction) in [`IndexView`] / [`IndexTxn`] and delegates here.
//! The walk logic therefore exists once, and every backend inherits the
//! same semantics.
//!
//! [`IndexStore`]: crate::index::IndexStore

use std::collections::BTreeSet;

use crate::error::Result;
use crate::index::{CascadeWave, ChildRecord, CollisionProbe, DeleteCommit, ListingSnapshot, WriteCommit};
use crate::paths;
use crate::record::{DirRecord, MetaRecord};

/// Read access to one user's slice of the index within one atomic step.
pub trait IndexView {
    fn meta(&self, path: &str) -> Result<Option<MetaRecord>>;
    fn dir(&self, dir: &str) -> Result<Option<DirRecord>>;
    fn children(&self, dir: &str) -> Result<BTreeSet<String>>;
}

/// Write access within one atomic step.
pub trait IndexTxn: IndexView {
    fn put_meta(&mut self, path: &str, record: &MetaRecord) -> Result<()>;
    fn remove_meta(&mut self, path: &str) -> Result<()>;
    fn put_dir(&mut self, dir: &str, record: &DirRecord) -> Result<()>;
    fn remove_dir(&mut self, dir: &str) -> Result<()>;
    fn add_child(&mut self, dir: &str, name: &str) -> Result<()>;
    fn remove_child(&mut self, dir: &str, name: &str) -> Result<()>;
}

/// The collision walk.
///
/// A write collides when a directory already sits at the document's own
/// path, or when one of the directories the write would imply is
/// currently a document. The walk runs deepest first and stops at the
/// first directory that already exists: everything above an established
/// directory was checked when that directory was created.
pub fn check_collision<V: IndexView + ?Sized>(view: &V, probe: &CollisionProbe) -> Result<bool> {
    if view.dir(&probe.dir_probe)?.is_some() {
        return Ok(true);
    }
    for dir in &probe.walk {
        if view.dir(dir)?.is_some() {
            return Ok(false);
        }
        let as_document = dir.trim_end_matches('/');
        if !as_document.is_empty() && view.meta(as_document)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Stores the leaf record and links it into its directory. Returns the
/// record previously stored at the path.
pub fn commit_write<T: IndexTxn + ?Sized>(
    txn: &mut T,
    commit: &WriteCommit,
) -> Result<Option<MetaRecord>> {
    let path = paths::join(&commit.directory, &commit.key);
    let prior = txn.meta(&path)?;
    txn.put_meta(&path, &commit.record)?;
    txn.add_child(&commit.directory, &commit.key)?;
    Ok(prior)
}

/// Removes the leaf record and unlinks it from its directory. Returns
/// the removed record, or `None` when nothing was stored.
pub fn commit_delete<T: IndexTxn + ?Sized>(
    txn: &mut T,
    removal: &DeleteCommit,
) -> Result<Option<MetaRecord>> {
    let path = paths::join(&removal.directory, &removal.key);
    let Some(prior) = txn.meta(&path)? else {
        return Ok(None);
    };
    txn.remove_meta(&path)?;
    txn.remove_child(&removal.directory, &removal.key)?;
    Ok(Some(prior))
}

/// Applies one delete cascade: each level is deleted when it has no
/// entries left, refreshed with its precomputed record otherwise. The
/// root is never deleted, only refreshed. Levels must come deepest
/// first so that emptying a child is visible to its parent's check.
pub fn cascade_delete<T: IndexTxn + ?Sized>(txn: &mut T, wave: &CascadeWave) -> Result<()> {
    for level in &wave.levels {
        let is_root = level.dir.is_empty();
        if !is_root && txn.children(&level.dir)?.is_empty() {
            txn.remove_dir(&level.dir)?;
            txn.remove_child(paths::parent_of(&level.dir), paths::leaf_name(&level.dir))?;
        } else {
            txn.put_dir(&level.dir, &level.refresh)?;
        }
    }
    Ok(())
}

/// Reads the directory record and the record behind every child entry
/// in one pass over a consistent view.
pub fn listing_snapshot<V: IndexView + ?Sized>(view: &V, dir: &str) -> Result<ListingSnapshot> {
    let dir_record = view.dir(dir)?;
    let mut entries = Vec::new();
    for name in view.children(dir)? {
        let path = paths::join(dir, &name);
        let record = if name.ends_with('/') {
            view.dir(&path)?.map(ChildRecord::Directory)
        } else {
            view.meta(&path)?.map(ChildRecord::Document)
        };
        match record {
            Some(record) => entries.push((name, record)),
            // A linked child without a record violates the tree
            // invariants; surface it in logs instead of fabricating.
            None => tracing::warn!(%path, "directory entry has no record, skipping"),
        }
    }
    Ok(ListingSnapshot {
        dir: dir_record,
        entries,
    })
}
