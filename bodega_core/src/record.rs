//! Persisted index records.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata for one stored document revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    /// Revision tag, unquoted.
    pub etag: String,
    /// Body size in bytes.
    pub size: u64,
    /// Media type as supplied on write.
    pub content_type: String,
    /// Milliseconds since the Unix epoch.
    pub modified: i64,
}

/// Metadata for one directory revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirRecord {
    /// Revision tag, unquoted.
    pub etag: String,
    /// Milliseconds since the Unix epoch.
    pub modified: i64,
}

impl MetaRecord {
    /// True when the attributes a client can observe differ. `modified`
    /// on its own does not count: a byte-identical rewrite must not churn
    /// ancestor revisions.
    pub fn visibly_differs_from(&self, other: &MetaRecord) -> bool {
        self.etag != other.etag
            || self.size != other.size
            || self.content_type != other.content_type
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(Error::backend)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<MetaRecord> {
        postcard::from_bytes(bytes).map_err(Error::backend)
    }
}

impl DirRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(Error::backend)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<DirRecord> {
        postcard::from_bytes(bytes).map_err(Error::backend)
    }
}
