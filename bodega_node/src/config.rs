use bodega_index_redb::RedbIndexConfig;
use bodega_store_local::LocalStoreConfig;
use bodega_store_s3::S3StoreConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub index: IndexStoreConfig,
    pub blobs: BlobStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum IndexStoreConfig {
    Memory,
    Redb(RedbIndexConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum BlobStoreConfig {
    Memory,
    Local(LocalStoreConfig),
    S3(S3StoreConfig),
}
