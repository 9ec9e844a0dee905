//! In-memory index store, for tests and ephemeral deployments.
//!
//! All state for one user lives in a single `UserSpace`; compound steps
//! run the shared `index::script` routines while holding the map lock,
//! which is what makes them atomic here.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bodega_core::Result;
use bodega_core::index::script::{self, IndexTxn, IndexView};
use bodega_core::index::{
    CascadeWave, CollisionProbe, DeleteCommit, IndexStore, ListingSnapshot, WriteCommit,
};
use bodega_core::record::{DirRecord, MetaRecord};

#[derive(Debug, Default)]
struct UserSpace {
    meta: BTreeMap<String, MetaRecord>,
    dirs: BTreeMap<String, DirRecord>,
    children: BTreeMap<String, BTreeSet<String>>,
    quota: i64,
    /// Token to raw `scope:permission` strings.
    scopes: BTreeMap<String, BTreeSet<String>>,
}

/// Index store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    users: RwLock<HashMap<String, UserSpace>>,
}

impl MemoryIndex {
    pub fn new() -> MemoryIndex {
        MemoryIndex::default()
    }

    fn read_space<T>(&self, user: &str, f: impl FnOnce(SpaceView<'_>) -> T) -> T {
        let users = self.users.read().unwrap();
        f(SpaceView(users.get(user)))
    }

    fn write_space<T>(&self, user: &str, f: impl FnOnce(&mut SpaceTxn<'_>) -> T) -> T {
        let mut users = self.users.write().unwrap();
        f(&mut SpaceTxn(users.entry(user.to_string()).or_default()))
    }
}

/// Read view over one user's space; an absent user reads as empty.
struct SpaceView<'a>(Option<&'a UserSpace>);

impl IndexView for SpaceView<'_> {
    fn meta(&self, path: &str) -> Result<Option<MetaRecord>> {
        Ok(self.0.and_then(|space| space.meta.get(path).cloned()))
    }

    fn dir(&self, dir: &str) -> Result<Option<DirRecord>> {
        Ok(self.0.and_then(|space| space.dirs.get(dir).cloned()))
    }

    fn children(&self, dir: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .0
            .and_then(|space| space.children.get(dir).cloned())
            .unwrap_or_default())
    }
}

struct SpaceTxn<'a>(&'a mut UserSpace);

impl IndexView for SpaceTxn<'_> {
    fn meta(&self, path: &str) -> Result<Option<MetaRecord>> {
        Ok(self.0.meta.get(path).cloned())
    }

    fn dir(&self, dir: &str) -> Result<Option<DirRecord>> {
        Ok(self.0.dirs.get(dir).cloned())
    }

    fn children(&self, dir: &str) -> Result<BTreeSet<String>> {
        Ok(self.0.children.get(dir).cloned().unwrap_or_default())
    }
}

impl IndexTxn for SpaceTxn<'_> {
    fn put_meta(&mut self, path: &str, record: &MetaRecord) -> Result<()> {
        self.0.meta.insert(path.to_string(), record.clone());
        Ok(())
    }

    fn remove_meta(&mut self, path: &str) -> Result<()> {
        self.0.meta.remove(path);
        Ok(())
    }

    fn put_dir(&mut self, dir: &str, record: &DirRecord) -> Result<()> {
        self.0.dirs.insert(dir.to_string(), record.clone());
        Ok(())
    }

    fn remove_dir(&mut self, dir: &str) -> Result<()> {
        self.0.dirs.remove(dir);
        Ok(())
    }

    fn add_child(&mut self, dir: &str, name: &str) -> Result<()> {
        self.0
            .children
            .entry(dir.to_string())
            .or_default()
            .insert(name.to_string());
        Ok(())
    }

    fn remove_child(&mut self, dir: &str, name: &str) -> Result<()> {
        if let Some(set) = self.0.children.get_mut(dir) {
            set.remove(name);
            if set.is_empty() {
                self.0.children.remove(dir);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for MemoryIndex {
    async fn read_meta(&self, user: &str, path: &str) -> Result<Option<MetaRecord>> {
        self.read_space(user, |view| view.meta(path))
    }

    async fn read_dir(&self, user: &str, dir: &str) -> Result<Option<DirRecord>> {
        self.read_space(user, |view| view.dir(dir))
    }

    async fn write_dir(&self, user: &str, dir: &str, record: DirRecord) -> Result<()> {
        self.write_space(user, |txn| txn.put_dir(dir, &record))
    }

    async fn read_children(&self, user: &str, dir: &str) -> Result<BTreeSet<String>> {
        self.read_space(user, |view| view.children(dir))
    }

    async fn link_child(&self, user: &str, dir: &str, name: &str) -> Result<()> {
        self.write_space(user, |txn| txn.add_child(dir, name))
    }

    async fn read_quota(&self, user: &str) -> Result<i64> {
        self.read_space(user, |view| Ok(view.0.map(|space| space.quota).unwrap_or(0)))
    }

    async fn adjust_quota(&self, user: &str, delta: i64) -> Result<i64> {
        self.write_space(user, |txn| {
            txn.0.quota += delta;
            Ok(txn.0.quota)
        })
    }

    async fn read_scopes(&self, user: &str, token: &str) -> Result<BTreeSet<String>> {
        self.read_space(user, |view| {
            Ok(view
                .0
                .and_then(|space| space.scopes.get(token).cloned())
                .unwrap_or_default())
        })
    }

    async fn write_scopes(&self, user: &str, token: &str, scopes: BTreeSet<String>) -> Result<()> {
        self.write_space(user, |txn| {
            txn.0.scopes.insert(token.to_string(), scopes);
            Ok(())
        })
    }

    async fn check_collision(&self, user: &str, probe: CollisionProbe) -> Result<bool> {
        self.read_space(user, |view| script::check_collision(&view, &probe))
    }

    async fn commit_write(&self, user: &str, commit: WriteCommit) -> Result<Option<MetaRecord>> {
        self.write_space(user, |txn| script::commit_write(txn, &commit))
    }

    async fn commit_delete(&self, user: &str, removal: DeleteCommit) -> Result<Option<MetaRecord>> {
        self.write_space(user, |txn| script::commit_delete(txn, &removal))
    }

    async fn cascade_delete(&self, user: &str, wave: CascadeWave) -> Result<()> {
        self.write_space(user, |txn| script::cascade_delete(txn, &wave))
    }

    async fn listing_snapshot(&self, user: &str, dir: &str) -> Result<ListingSnapshot> {
        self.read_space(user, |view| script::listing_snapshot(&view, dir))
    }
}
