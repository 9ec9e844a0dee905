//! Test utilities for `IndexStore` and `BlobAdapter` implementations.
//!
//! Each suite runs a set of contract checks against a backend under a
//! random per-run namespace, so suites can run repeatedly against shared
//! or persistent backends without interfering with earlier runs.
//!
//! # Usage
//!
//! In your backend crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! bodega_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use bodega_core::testutil::IndexStoreTests;
//!
//! #[tokio::test]
//! async fn conformance() {
//!     let store = MyIndex::new(...);
//!     IndexStoreTests::new(&store).run_all().await.unwrap();
//! }
//! ```

use std::collections::BTreeSet;

use bytes::Bytes;
use rand::Rng;

use crate::blob::BlobAdapter;
use crate::index::{
    CascadeLevel, CascadeWave, ChildRecord, CollisionProbe, DeleteCommit, IndexStore, WriteCommit,
};
use crate::record::{DirRecord, MetaRecord};

fn sample_meta(etag: &str, size: u64) -> MetaRecord {
    MetaRecord {
        etag: etag.to_string(),
        size,
        content_type: "text/plain".to_string(),
        modified: 1_700_000_000_000,
    }
}

fn sample_dir(etag: &str) -> DirRecord {
    DirRecord {
        etag: etag.to_string(),
        modified: 1_700_000_000_000,
    }
}

/// Contract test suite for [`IndexStore`] implementations.
pub struct IndexStoreTests<'a, S> {
    store: &'a S,
    /// Random user so repeated runs never collide.
    user: String,
}

impl<'a, S: IndexStore> IndexStoreTests<'a, S> {
    /// Create a new test suite for the given store.
    pub fn new(store: &'a S) -> Self {
        let user = format!("_test_user_{}", rand::rng().random::<u32>());
        Self { store, user }
    }

    /// Run all tests.
    pub async fn run_all(&self) -> crate::Result<()> {
        self.test_commit_write_and_read().await?;
        self.test_commit_delete().await?;
        self.test_dir_records().await?;
        self.test_children_links().await?;
        self.test_quota_math().await?;
        self.test_scopes_roundtrip().await?;
        self.test_collision_walk().await?;
        self.test_cascade().await?;
        self.test_listing_snapshot().await?;
        Ok(())
    }

    async fn write(&self, directory: &str, key: &str, record: MetaRecord) -> crate::Result<Option<MetaRecord>> {
        self.store
            .commit_write(
                &self.user,
                WriteCommit {
                    directory: directory.to_string(),
                    key: key.to_string(),
                    record,
                },
            )
            .await
    }

    pub async fn test_commit_write_and_read(&self) -> crate::Result<()> {
        let prior = self.write("write/", "doc", sample_meta("w1", 3)).await?;
        assert!(prior.is_none(), "first write must find no prior record");

        let stored = self.store.read_meta(&self.user, "write/doc").await?;
        assert_eq!(stored, Some(sample_meta("w1", 3)), "record should roundtrip");
        assert!(
            self.store
                .read_children(&self.user, "write/")
                .await?
                .contains("doc"),
            "leaf must be linked into its directory"
        );

        let prior = self.write("write/", "doc", sample_meta("w2", 4)).await?;
        assert_eq!(
            prior,
            Some(sample_meta("w1", 3)),
            "rewrite must return the replaced record"
        );
        Ok(())
    }

    pub async fn test_commit_delete(&self) -> crate::Result<()> {
        self.write("delete/", "doc", sample_meta("d1", 5)).await?;

        let removal = DeleteCommit {
            directory: "delete/".to_string(),
            key: "doc".to_string(),
        };
        let removed = self.store.commit_delete(&self.user, removal.clone()).await?;
        assert_eq!(removed, Some(sample_meta("d1", 5)));
        assert_eq!(self.store.read_meta(&self.user, "delete/doc").await?, None);
        assert!(
            self.store
                .read_children(&self.user, "delete/")
                .await?
                .is_empty(),
            "delete must unlink the child"
        );

        let removed = self.store.commit_delete(&self.user, removal).await?;
        assert!(removed.is_none(), "second delete must find nothing");
        Ok(())
    }

    pub async fn test_dir_records(&self) -> crate::Result<()> {
        assert_eq!(self.store.read_dir(&self.user, "dirs/").await?, None);

        self.store
            .write_dir(&self.user, "dirs/", sample_dir("v1"))
            .await?;
        assert_eq!(
            self.store.read_dir(&self.user, "dirs/").await?,
            Some(sample_dir("v1"))
        );

        self.store
            .write_dir(&self.user, "dirs/", sample_dir("v2"))
            .await?;
        assert_eq!(
            self.store.read_dir(&self.user, "dirs/").await?,
            Some(sample_dir("v2")),
            "write_dir must replace the record"
        );
        Ok(())
    }

    pub async fn test_children_links(&self) -> crate::Result<()> {
        self.store.link_child(&self.user, "links/", "b").await?;
        self.store.link_child(&self.user, "links/", "a/").await?;
        self.store.link_child(&self.user, "links/", "b").await?;

        let children = self.store.read_children(&self.user, "links/").await?;
        let expected: BTreeSet<String> = ["a/".to_string(), "b".to_string()].into();
        assert_eq!(children, expected, "link_child must be idempotent");
        Ok(())
    }

    pub async fn test_quota_math(&self) -> crate::Result<()> {
        assert_eq!(
            self.store.read_quota(&self.user).await?,
            0,
            "fresh user starts at zero"
        );
        assert_eq!(self.store.adjust_quota(&self.user, 10).await?, 10);
        assert_eq!(self.store.adjust_quota(&self.user, -3).await?, 7);
        assert_eq!(self.store.read_quota(&self.user).await?, 7);
        Ok(())
    }

    pub async fn test_scopes_roundtrip(&self) -> crate::Result<()> {
        assert!(
            self.store
                .read_scopes(&self.user, "token-a")
                .await?
                .is_empty(),
            "unknown token has no scopes"
        );

        let scopes: BTreeSet<String> = ["food:rw".to_string(), ":r".to_string()].into();
        self.store
            .write_scopes(&self.user, "token-a", scopes.clone())
            .await?;
        assert_eq!(self.store.read_scopes(&self.user, "token-a").await?, scopes);

        let replacement: BTreeSet<String> = ["drinks:r".to_string()].into();
        self.store
            .write_scopes(&self.user, "token-a", replacement.clone())
            .await?;
        assert_eq!(
            self.store.read_scopes(&self.user, "token-a").await?,
            replacement,
            "write_scopes must replace, not merge"
        );
        Ok(())
    }

    pub async fn test_collision_walk(&self) -> crate::Result<()> {
        self.write("walk/deep/", "doc", sample_meta("c1", 1)).await?;
        self.store
            .write_dir(&self.user, "walk/deep/", sample_dir("cd1"))
            .await?;

        let onto_directory = CollisionProbe::for_write("walk/", "deep");
        assert!(
            self.store
                .check_collision(&self.user, onto_directory)
                .await?,
            "a document cannot replace an existing directory"
        );

        let under_document = CollisionProbe::for_write("walk/deep/doc/", "inner");
        assert!(
            self.store
                .check_collision(&self.user, under_document)
                .await?,
            "a directory cannot shadow an existing document"
        );

        let clean = CollisionProbe::for_write("walk/deep/", "other");
        assert!(
            !self.store.check_collision(&self.user, clean).await?,
            "an established directory admits new documents"
        );
        Ok(())
    }

    pub async fn test_cascade(&self) -> crate::Result<()> {
        self.write("casc/a/", "doc", sample_meta("x1", 1)).await?;
        for (dir, name) in [("", "casc/"), ("casc/", "a/")] {
            self.store.link_child(&self.user, dir, name).await?;
        }
        for dir in ["", "casc/", "casc/a/"] {
            self.store
                .write_dir(&self.user, dir, sample_dir("pre"))
                .await?;
        }
        self.store
            .commit_delete(
                &self.user,
                DeleteCommit {
                    directory: "casc/a/".to_string(),
                    key: "doc".to_string(),
                },
            )
            .await?;

        let wave = CascadeWave {
            levels: vec![
                CascadeLevel {
                    dir: "casc/a/".to_string(),
                    refresh: sample_dir("post"),
                },
                CascadeLevel {
                    dir: "casc/".to_string(),
                    refresh: sample_dir("post"),
                },
                CascadeLevel {
                    dir: String::new(),
                    refresh: sample_dir("post"),
                },
            ],
        };
        self.store.cascade_delete(&self.user, wave).await?;

        assert_eq!(
            self.store.read_dir(&self.user, "casc/a/").await?,
            None,
            "emptied level must be deleted"
        );
        assert_eq!(self.store.read_dir(&self.user, "casc/").await?, None);
        assert!(
            !self
                .store
                .read_children(&self.user, "")
                .await?
                .contains("casc/"),
            "deleted level must be unlinked from the root"
        );
        assert_eq!(
            self.store.read_dir(&self.user, "").await?,
            Some(sample_dir("post")),
            "root is refreshed, never deleted"
        );
        Ok(())
    }

    pub async fn test_listing_snapshot(&self) -> crate::Result<()> {
        self.write("snap/", "doc", sample_meta("s1", 2)).await?;
        self.store
            .write_dir(&self.user, "snap/sub/", sample_dir("s2"))
            .await?;
        self.store.link_child(&self.user, "snap/", "sub/").await?;
        self.store
            .write_dir(&self.user, "snap/", sample_dir("s3"))
            .await?;

        let snapshot = self.store.listing_snapshot(&self.user, "snap/").await?;
        assert_eq!(snapshot.dir, Some(sample_dir("s3")));
        assert_eq!(snapshot.entries.len(), 2);
        assert!(snapshot.entries.iter().any(|(name, record)| {
            name == "doc" && matches!(record, ChildRecord::Document(m) if m.etag == "s1")
        }));
        assert!(snapshot.entries.iter().any(|(name, record)| {
            name == "sub/" && matches!(record, ChildRecord::Directory(d) if d.etag == "s2")
        }));

        let empty = self.store.listing_snapshot(&self.user, "nowhere/").await?;
        assert!(empty.dir.is_none());
        assert!(empty.entries.is_empty());
        Ok(())
    }
}

/// Contract test suite for [`BlobAdapter`] implementations.
pub struct BlobAdapterTests<'a, B> {
    store: &'a B,
    /// Prefix for test blobs to avoid conflicts.
    prefix: String,
}

impl<'a, B: BlobAdapter> BlobAdapterTests<'a, B> {
    /// Create a new test suite for the given adapter.
    pub fn new(store: &'a B) -> Self {
        let prefix = format!("_test_{}/", rand::rng().random::<u32>());
        Self { store, prefix }
    }

    fn path(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Run all tests.
    pub async fn run_all(&self) -> crate::Result<()> {
        self.test_store_fetch_roundtrip().await?;
        self.test_head().await?;
        self.test_overwrite().await?;
        self.test_remove().await?;
        self.test_absent_paths().await?;
        self.test_receipt_matches_features().await?;

        if self.store.features().derives_listings {
            self.test_list_children().await?;
        }

        self.cleanup().await?;
        Ok(())
    }

    pub async fn test_store_fetch_roundtrip(&self) -> crate::Result<()> {
        let path = self.path("roundtrip.txt");
        let body = Bytes::from_static(b"tostada con tomate");

        self.store.store(&path, body.clone(), "text/plain").await?;

        let object = self
            .store
            .fetch(&path)
            .await?
            .expect("stored blob must be fetchable");
        assert_eq!(object.body, body, "body should roundtrip");
        assert_eq!(object.content_type, "text/plain");
        assert!(object.modified > 0, "modified timestamp should be set");
        Ok(())
    }

    pub async fn test_head(&self) -> crate::Result<()> {
        let path = self.path("head.txt");
        let body = Bytes::from_static(b"12345");
        self.store.store(&path, body, "application/json").await?;

        let head = self
            .store
            .head(&path)
            .await?
            .expect("stored blob must have a head");
        assert_eq!(head.size, 5, "head size should match body length");
        assert_eq!(head.content_type, "application/json");
        Ok(())
    }

    pub async fn test_overwrite(&self) -> crate::Result<()> {
        let path = self.path("overwrite.txt");
        self.store
            .store(&path, Bytes::from_static(b"first"), "text/plain")
            .await?;
        self.store
            .store(&path, Bytes::from_static(b"second"), "text/plain")
            .await?;

        let object = self.store.fetch(&path).await?.expect("blob must exist");
        assert_eq!(
            object.body,
            Bytes::from_static(b"second"),
            "overwrite should replace the body"
        );
        Ok(())
    }

    pub async fn test_remove(&self) -> crate::Result<()> {
        let path = self.path("remove.txt");
        self.store
            .store(&path, Bytes::from_static(b"bye"), "text/plain")
            .await?;

        assert!(self.store.remove(&path).await?, "first remove finds the blob");
        assert!(self.store.fetch(&path).await?.is_none());
        assert!(
            !self.store.remove(&path).await?,
            "second remove must report the blob as absent"
        );
        Ok(())
    }

    pub async fn test_absent_paths(&self) -> crate::Result<()> {
        let path = self.path("never-written.txt");
        assert!(self.store.fetch(&path).await?.is_none());
        assert!(self.store.head(&path).await?.is_none());
        Ok(())
    }

    pub async fn test_receipt_matches_features(&self) -> crate::Result<()> {
        let path = self.path("receipt.txt");
        let receipt = self
            .store
            .store(&path, Bytes::from_static(b"tag me"), "text/plain")
            .await?;
        assert_eq!(
            receipt.etag.is_some(),
            self.store.features().supplies_etag,
            "receipt etag presence must match the advertised features"
        );
        assert!(receipt.modified > 0);
        Ok(())
    }

    pub async fn test_list_children(&self) -> crate::Result<()> {
        let base = self.path("list/");
        self.store
            .store(&format!("{base}a.txt"), Bytes::from_static(b"aa"), "text/plain")
            .await?;
        self.store
            .store(
                &format!("{base}sub/b.txt"),
                Bytes::from_static(b"bbb"),
                "text/plain",
            )
            .await?;

        let children = self.store.list_children(&base).await?;
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"a.txt"), "direct document should be listed");
        assert!(
            names.contains(&"sub/"),
            "nested content should appear as a directory entry"
        );
        assert!(
            !names.iter().any(|n| n.contains("b.txt")),
            "only direct children should be listed"
        );

        let doc = children.iter().find(|c| c.name == "a.txt").expect("doc entry");
        assert_eq!(doc.size, Some(2), "document entries should carry sizes");
        Ok(())
    }

    async fn cleanup(&self) -> crate::Result<()> {
        for name in [
            "roundtrip.txt",
            "head.txt",
            "overwrite.txt",
            "remove.txt",
            "receipt.txt",
            "list/a.txt",
            "list/sub/b.txt",
        ] {
            self.store.remove(&self.path(name)).await?;
        }
        Ok(())
    }
}
