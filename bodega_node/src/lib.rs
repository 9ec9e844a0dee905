use std::sync::Arc;

use bodega_core::{BlobAdapter, IndexStore, Result};
use bodega_index_memory::MemoryIndex;
use bodega_index_redb::RedbIndex;
use bodega_store_local::LocalStore;
use bodega_store_memory::MemoryStore;
use bodega_store_s3::S3Store;
use bodega_tree::Storage;

use crate::config::{BlobStoreConfig, IndexStoreConfig, NodeConfig};

pub mod config;

pub fn create_index(config: IndexStoreConfig) -> Result<Arc<dyn IndexStore>> {
    let index: Arc<dyn IndexStore> = match config {
        IndexStoreConfig::Memory => Arc::new(MemoryIndex::new()),
        IndexStoreConfig::Redb(config) => Arc::new(RedbIndex::create(&config)?),
    };
    Ok(index)
}

pub fn create_blobs(config: BlobStoreConfig) -> Result<Arc<dyn BlobAdapter>> {
    let blobs: Arc<dyn BlobAdapter> = match config {
        BlobStoreConfig::Memory => Arc::new(MemoryStore::new()),
        BlobStoreConfig::Local(config) => Arc::new(LocalStore::create(config)),
        BlobStoreConfig::S3(config) => Arc::new(S3Store::create(config)),
    };
    Ok(blobs)
}

/// A running node: the storage engine wired to the backends named in
/// its config.
#[derive(Debug)]
pub struct Node {
    storage: Storage,
}

impl Node {
    pub fn start(config: NodeConfig) -> Result<Node> {
        let index = create_index(config.index)?;
        let blobs = create_blobs(config.blobs)?;
        Ok(Node {
            storage: Storage::new(index, blobs),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Drops the engine and its backends. The redb index flushes and
    /// closes on drop, so there is no separate close step.
    pub fn shutdown(self) {}
}

pub async fn run_node(config: NodeConfig) -> anyhow::Result<()> {
    let node = Node::start(config)?;
    tracing::info!("node started, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;

    println!("Shutting down.");
    node.shutdown();

    Ok(())
}
