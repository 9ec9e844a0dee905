//! Redb-backed index store.
//!
//! Persists metadata records, directory records, child links, quota
//! counters and authorization scopes in a single redb database file.
//! Compound operations run inside one write transaction, so a crash
//! never leaves a half-applied write or delete behind.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bodega_core::index::script::{self, IndexTxn, IndexView};
use bodega_core::{
    CascadeWave, CollisionProbe, DeleteCommit, DirRecord, Error, ListingSnapshot, MetaRecord,
    Result, WriteCommit,
};
use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable, Table,
    TableDefinition, WriteTransaction,
};
use tokio::task;

/// Document metadata, keyed by (user, document path).
const META: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("meta");
/// Directory records, keyed by (user, directory path).
const DIRS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("dirs");
/// Child name sets, keyed by (user, directory path).
const CHILDREN: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("children");
/// Byte totals per user.
const QUOTA: TableDefinition<&str, i64> = TableDefinition::new("quota");
/// Authorization scope sets, keyed by (user, token).
const SCOPES: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("scopes");

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct RedbIndexConfig {
    pub base_path: String,
}

pub struct RedbIndex {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbIndex").finish()
    }
}

impl RedbIndex {
    pub fn create(config: &RedbIndexConfig) -> Result<RedbIndex> {
        Self::open(&config.base_path)
    }

    /// Opens (or initializes) the index database under the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<RedbIndex> {
        std::fs::create_dir_all(path.as_ref()).map_err(Error::backend)?;
        let db = Database::create(path.as_ref().join("index.redb")).map_err(Error::backend)?;

        // Make sure all tables exist, otherwise the first read on a
        // fresh database fails with TableDoesNotExist.
        let txn = db.begin_write().map_err(Error::backend)?;
        {
            txn.open_table(META).map_err(Error::backend)?;
            txn.open_table(DIRS).map_err(Error::backend)?;
            txn.open_table(CHILDREN).map_err(Error::backend)?;
            txn.open_table(QUOTA).map_err(Error::backend)?;
            txn.open_table(SCOPES).map_err(Error::backend)?;
        }
        txn.commit().map_err(Error::backend)?;

        Ok(RedbIndex { db: Arc::new(db) })
    }
}

fn get_meta(
    table: &impl ReadableTable<(&'static str, &'static str), &'static [u8]>,
    user: &str,
    path: &str,
) -> Result<Option<MetaRecord>> {
    table
        .get((user, path))
        .map_err(Error::backend)?
        .map(|guard| MetaRecord::from_bytes(guard.value()))
        .transpose()
}

fn get_dir(
    table: &impl ReadableTable<(&'static str, &'static str), &'static [u8]>,
    user: &str,
    path: &str,
) -> Result<Option<DirRecord>> {
    table
        .get((user, path))
        .map_err(Error::backend)?
        .map(|guard| DirRecord::from_bytes(guard.value()))
        .transpose()
}

fn get_names(
    table: &impl ReadableTable<(&'static str, &'static str), &'static [u8]>,
    user: &str,
    path: &str,
) -> Result<BTreeSet<String>> {
    match table.get((user, path)).map_err(Error::backend)? {
        Some(guard) => postcard::from_bytes(guard.value()).map_err(Error::backend),
        None => Ok(BTreeSet::new()),
    }
}

fn encode_names(names: &BTreeSet<String>) -> Result<Vec<u8>> {
    postcard::to_allocvec(names).map_err(Error::backend)
}

/// Read-only view over one user's slice of the index tables.
struct ReadIndex<'a> {
    user: &'a str,
    meta: ReadOnlyTable<(&'static str, &'static str), &'static [u8]>,
    dirs: ReadOnlyTable<(&'static str, &'static str), &'static [u8]>,
    children: ReadOnlyTable<(&'static str, &'static str), &'static [u8]>,
}

impl<'a> ReadIndex<'a> {
    fn open(txn: &ReadTransaction, user: &'a str) -> Result<ReadIndex<'a>> {
        Ok(ReadIndex {
            user,
            meta: txn.open_table(META).map_err(Error::backend)?,
            dirs: txn.open_table(DIRS).map_err(Error::backend)?,
            children: txn.open_table(CHILDREN).map_err(Error::backend)?,
        })
    }
}

impl IndexView for ReadIndex<'_> {
    fn meta(&self, path: &str) -> Result<Option<MetaRecord>> {
        get_meta(&self.meta, self.user, path)
    }

    fn dir(&self, path: &str) -> Result<Option<DirRecord>> {
        get_dir(&self.dirs, self.user, path)
    }

    fn children(&self, dir: &str) -> Result<BTreeSet<String>> {
        get_names(&self.children, self.user, dir)
    }
}

/// Mutable view over one user's slice, bound to a write transaction.
struct WriteIndex<'t> {
    user: &'t str,
    meta: Table<'t, (&'static str, &'static str), &'static [u8]>,
    dirs: Table<'t, (&'static str, &'static str), &'static [u8]>,
    children: Table<'t, (&'static str, &'static str), &'static [u8]>,
}

impl<'t> WriteIndex<'t> {
    fn open(txn: &'t WriteTransaction, user: &'t str) -> Result<WriteIndex<'t>> {
        Ok(WriteIndex {
            user,
            meta: txn.open_table(META).map_err(Error::backend)?,
            dirs: txn.open_table(DIRS).map_err(Error::backend)?,
            children: txn.open_table(CHILDREN).map_err(Error::backend)?,
        })
    }
}

impl IndexView for WriteIndex<'_> {
    fn meta(&self, path: &str) -> Result<Option<MetaRecord>> {
        get_meta(&self.meta, self.user, path)
    }

    fn dir(&self, path: &str) -> Result<Option<DirRecord>> {
        get_dir(&self.dirs, self.user, path)
    }

    fn children(&self, dir: &str) -> Result<BTreeSet<String>> {
        get_names(&self.children, self.user, dir)
    }
}

impl IndexTxn for WriteIndex<'_> {
    fn put_meta(&mut self, path: &str, record: &MetaRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        self.meta
            .insert((self.user, path), bytes.as_slice())
            .map_err(Error::backend)?;
        Ok(())
    }

    fn remove_meta(&mut self, path: &str) -> Result<()> {
        self.meta
            .remove((self.user, path))
            .map_err(Error::backend)?;
        Ok(())
    }

    fn put_dir(&mut self, path: &str, record: &DirRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        self.dirs
            .insert((self.user, path), bytes.as_slice())
            .map_err(Error::backend)?;
        Ok(())
    }

    fn remove_dir(&mut self, path: &str) -> Result<()> {
        self.dirs
            .remove((self.user, path))
            .map_err(Error::backend)?;
        Ok(())
    }

    fn add_child(&mut self, dir: &str, name: &str) -> Result<()> {
        let mut names = IndexView::children(self, dir)?;
        if names.insert(name.to_string()) {
            let bytes = encode_names(&names)?;
            self.children
                .insert((self.user, dir), bytes.as_slice())
                .map_err(Error::backend)?;
        }
        Ok(())
    }

    fn remove_child(&mut self, dir: &str, name: &str) -> Result<()> {
        let mut names = IndexView::children(self, dir)?;
        if names.remove(name) {
            if names.is_empty() {
                self.children
                    .remove((self.user, dir))
                    .map_err(Error::backend)?;
            } else {
                let bytes = encode_names(&names)?;
                self.children
                    .insert((self.user, dir), bytes.as_slice())
                    .map_err(Error::backend)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl bodega_core::IndexStore for RedbIndex {
    async fn read_meta(&self, user: &str, path: &str) -> Result<Option<MetaRecord>> {
        let db = self.db.clone();
        let user = user.to_string();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(Error::backend)?;
            let index = ReadIndex::open(&txn, &user)?;
            index.meta(&path)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb read task failed: {}", e)))?
    }

    async fn read_dir(&self, user: &str, path: &str) -> Result<Option<DirRecord>> {
        let db = self.db.clone();
        let user = user.to_string();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(Error::backend)?;
            let index = ReadIndex::open(&txn, &user)?;
            index.dir(&path)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb read task failed: {}", e)))?
    }

    async fn write_dir(&self, user: &str, path: &str, record: DirRecord) -> Result<()> {
        let db = self.db.clone();
        let user = user.to_string();
        let path = path.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(Error::backend)?;
            {
                let mut index = WriteIndex::open(&txn, &user)?;
                index.put_dir(&path, &record)?;
            }
            txn.commit().map_err(Error::backend)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb write task failed: {}", e)))?
    }

    async fn read_children(&self, user: &str, dir: &str) -> Result<BTreeSet<String>> {
        let db = self.db.clone();
        let user = user.to_string();
        let dir = dir.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(Error::backend)?;
            let index = ReadIndex::open(&txn, &user)?;
            index.children(&dir)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb read task failed: {}", e)))?
    }

    async fn link_child(&self, user: &str, dir: &str, name: &str) -> Result<()> {
        let db = self.db.clone();
        let user = user.to_string();
        let dir = dir.to_string();
        let name = name.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(Error::backend)?;
            {
                let mut index = WriteIndex::open(&txn, &user)?;
                index.add_child(&dir, &name)?;
            }
            txn.commit().map_err(Error::backend)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb write task failed: {}", e)))?
    }

    async fn read_quota(&self, user: &str) -> Result<i64> {
        let db = self.db.clone();
        let user = user.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(Error::backend)?;
            let table = txn.open_table(QUOTA).map_err(Error::backend)?;
            let used = table
                .get(user.as_str())
                .map_err(Error::backend)?
                .map(|guard| guard.value())
                .unwrap_or(0);
            Ok(used)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb read task failed: {}", e)))?
    }

    async fn adjust_quota(&self, user: &str, delta: i64) -> Result<i64> {
        let db = self.db.clone();
        let user = user.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(Error::backend)?;
            let total = {
                let mut table = txn.open_table(QUOTA).map_err(Error::backend)?;
                let used = table
                    .get(user.as_str())
                    .map_err(Error::backend)?
                    .map(|guard| guard.value())
                    .unwrap_or(0);
                let total = used + delta;
                table
                    .insert(user.as_str(), total)
                    .map_err(Error::backend)?;
                total
            };
            txn.commit().map_err(Error::backend)?;
            Ok(total)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb write task failed: {}", e)))?
    }

    async fn read_scopes(&self, user: &str, token: &str) -> Result<BTreeSet<String>> {
        let db = self.db.clone();
        let user = user.to_string();
        let token = token.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(Error::backend)?;
            let table = txn.open_table(SCOPES).map_err(Error::backend)?;
            get_names(&table, &user, &token)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb read task failed: {}", e)))?
    }

    async fn write_scopes(&self, user: &str, token: &str, scopes: BTreeSet<String>) -> Result<()> {
        let db = self.db.clone();
        let user = user.to_string();
        let token = token.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(Error::backend)?;
            {
                let mut table = txn.open_table(SCOPES).map_err(Error::backend)?;
                let bytes = encode_names(&scopes)?;
                table
                    .insert((user.as_str(), token.as_str()), bytes.as_slice())
                    .map_err(Error::backend)?;
            }
            txn.commit().map_err(Error::backend)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb write task failed: {}", e)))?
    }

    async fn check_collision(&self, user: &str, probe: CollisionProbe) -> Result<bool> {
        let db = self.db.clone();
        let user = user.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(Error::backend)?;
            let index = ReadIndex::open(&txn, &user)?;
            script::check_collision(&index, &probe)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb read task failed: {}", e)))?
    }

    async fn commit_write(&self, user: &str, commit: WriteCommit) -> Result<Option<MetaRecord>> {
        let db = self.db.clone();
        let user = user.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(Error::backend)?;
            let prior = {
                let mut index = WriteIndex::open(&txn, &user)?;
                script::commit_write(&mut index, &commit)?
            };
            txn.commit().map_err(Error::backend)?;
            Ok(prior)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb write task failed: {}", e)))?
    }

    async fn commit_delete(&self, user: &str, commit: DeleteCommit) -> Result<Option<MetaRecord>> {
        let db = self.db.clone();
        let user = user.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(Error::backend)?;
            let removed = {
                let mut index = WriteIndex::open(&txn, &user)?;
                script::commit_delete(&mut index, &commit)?
            };
            txn.commit().map_err(Error::backend)?;
            Ok(removed)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb write task failed: {}", e)))?
    }

    async fn cascade_delete(&self, user: &str, wave: CascadeWave) -> Result<()> {
        let db = self.db.clone();
        let user = user.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(Error::backend)?;
            {
                let mut index = WriteIndex::open(&txn, &user)?;
                script::cascade_delete(&mut index, &wave)?;
            }
            txn.commit().map_err(Error::backend)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb write task failed: {}", e)))?
    }

    async fn listing_snapshot(&self, user: &str, dir: &str) -> Result<ListingSnapshot> {
        let db = self.db.clone();
        let user = user.to_string();
        let dir = dir.to_string();
        task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(Error::backend)?;
            let index = ReadIndex::open(&txn, &user)?;
            script::listing_snapshot(&index, &dir)
        })
        .await
        .map_err(|e| Error::backend(anyhow::anyhow!("redb read task failed: {}", e)))?
    }
}
