//! The request engine.
//!
//! [`Storage`] is the façade a transport talks to: it validates paths
//! and media types, evaluates conditional headers, detects collisions,
//! commits writes and deletes, keeps ancestor revisions fresh and tracks
//! quota. Outcomes map onto HTTP statuses; failures map through
//! [`Error::http_status`].
//!
//! [`Error::http_status`]: bodega_core::Error::http_status

use std::sync::Arc;

use bodega_core::{
    AuthorizationGrant, BlobAdapter, Error, IndexStore, MetaRecord, Permission, Result, auth,
    etag, paths,
};
use bytes::Bytes;
use chrono::Utc;

use crate::collision::CollisionDetector;
use crate::listing::{Listing, ListingAssembler};
use crate::quota::QuotaAccountant;
use crate::tree::TreeIndex;

/// Conditional headers, already extracted from the transport.
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

/// One document write.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub body: Bytes,
    pub content_type: String,
    /// Present when the client attempted a partial write; always rejected.
    pub content_range: Option<String>,
    pub preconditions: Preconditions,
}

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Document {
    pub body: Bytes,
    pub content_type: String,
    pub etag: String,
    /// Milliseconds since the Unix epoch.
    pub modified: i64,
}

/// Outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Created { etag: String },
    Updated { etag: String },
}

impl PutOutcome {
    pub fn etag(&self) -> &str {
        match self {
            PutOutcome::Created { etag } | PutOutcome::Updated { etag } => etag,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            PutOutcome::Created { .. } => 201,
            PutOutcome::Updated { .. } => 200,
        }
    }
}

/// Outcome of a document read.
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Fetched(Document),
    /// The client's cached revision is current.
    NotModified { etag: String },
}

impl GetOutcome {
    pub fn status(&self) -> u16 {
        match self {
            GetOutcome::Fetched(_) => 200,
            GetOutcome::NotModified { .. } => 304,
        }
    }
}

/// Outcome of a listing read.
#[derive(Debug, Clone)]
pub enum ListOutcome {
    Listed(Listing),
    NotModified { etag: String },
}

impl ListOutcome {
    pub fn status(&self) -> u16 {
        match self {
            ListOutcome::Listed(_) => 200,
            ListOutcome::NotModified { .. } => 304,
        }
    }
}

/// Outcome of a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReceipt {
    /// Revision tag of the document that was removed.
    pub etag: String,
}

/// The storage engine. One per node, shared across requests.
#[derive(Debug, Clone)]
pub struct Storage {
    tree: TreeIndex,
    collisions: CollisionDetector,
    quota: QuotaAccountant,
    listings: ListingAssembler,
    index: Arc<dyn IndexStore>,
    blobs: Arc<dyn BlobAdapter>,
}

impl Storage {
    pub fn new(index: Arc<dyn IndexStore>, blobs: Arc<dyn BlobAdapter>) -> Storage {
        Storage {
            tree: TreeIndex::new(index.clone()),
            collisions: CollisionDetector::new(index.clone()),
            quota: QuotaAccountant::new(index.clone()),
            listings: ListingAssembler::new(index.clone()),
            index,
            blobs,
        }
    }

    /// Writes one document revision.
    ///
    /// Returns `Created` for a new path, `Updated` for a replacement.
    /// A rewrite with no visible change still succeeds but leaves every
    /// ancestor revision untouched.
    pub async fn put_document(
        &self,
        user: &str,
        path: &str,
        request: PutRequest,
    ) -> Result<PutOutcome> {
        paths::validate_document(path)?;
        if request.content_range.is_some() {
            return Err(Error::UnsupportedRequest(
                "Content-Range is not supported on writes".to_string(),
            ));
        }
        validate_media_type(&request.content_type)?;

        let current = self.tree.read_metadata(user, path).await?;
        check_write_preconditions(
            &request.preconditions,
            current.as_ref().map(|record| record.etag.as_str()),
        )?;

        let directory = paths::parent_of(path);
        let key = paths::leaf_name(path);
        if self.collisions.check(user, directory, key).await? {
            return Err(Error::Conflict(format!(
                "path is already claimed by an entry of the other kind: {path:?}"
            )));
        }

        let checksum = etag::document(&request.body);
        let size = request.body.len() as u64;
        let receipt = self
            .blobs
            .store(&blob_path(user, path), request.body, &request.content_type)
            .await?;

        let record = MetaRecord {
            etag: receipt.etag.unwrap_or_else(|| checksum.clone()),
            size,
            content_type: request.content_type,
            modified: receipt.modified,
        };
        let etag = record.etag.clone();
        let modified = record.modified;

        let write = self.tree.put_metadata(user, directory, key, record).await?;

        if write.changed {
            if let Err(e) = self.tree.propagate(user, directory, modified, &checksum).await {
                tracing::error!(user, path, error = %e, "ancestor propagation failed");
                return Err(e);
            }
        } else {
            tracing::debug!(user, path, "rewrite left no visible change, ancestors untouched");
        }

        let prior_size = write.prior.as_ref().map(|p| p.size as i64).unwrap_or(0);
        self.quota
            .adjust(user, size as i64 - prior_size, write.prior.is_none())
            .await?;

        Ok(match write.prior {
            None => PutOutcome::Created { etag },
            Some(_) => PutOutcome::Updated { etag },
        })
    }

    /// Reads one document, honoring `If-None-Match`.
    pub async fn get_document(
        &self,
        user: &str,
        path: &str,
        preconditions: &Preconditions,
    ) -> Result<GetOutcome> {
        if paths::validate_document(path).is_err() {
            return Err(Error::NotFound(format!("no document at {path:?}")));
        }
        let Some(record) = self.tree.read_metadata(user, path).await? else {
            return Err(Error::NotFound(format!("no document at {path:?}")));
        };

        if let Some(header) = preconditions.if_none_match.as_deref() {
            if etag::has_wildcard(header) || etag::any_match(header, &record.etag) {
                return Ok(GetOutcome::NotModified { etag: record.etag });
            }
        }

        let Some(object) = self.blobs.fetch(&blob_path(user, path)).await? else {
            return Err(Error::backend(anyhow::anyhow!(
                "index record exists but blob is missing: {path:?}"
            )));
        };

        Ok(GetOutcome::Fetched(Document {
            body: object.body,
            content_type: record.content_type,
            etag: record.etag,
            modified: record.modified,
        }))
    }

    /// Reads one directory listing, honoring `If-None-Match`.
    pub async fn get_listing(
        &self,
        user: &str,
        directory: &str,
        preconditions: &Preconditions,
    ) -> Result<ListOutcome> {
        if paths::validate_directory(directory).is_err() {
            return Err(Error::NotFound(format!("no directory at {directory:?}")));
        }
        let listing = self.listings.list(user, directory).await?;

        if let Some(header) = preconditions.if_none_match.as_deref() {
            if etag::has_wildcard(header) || etag::any_match(header, &listing.etag) {
                return Ok(ListOutcome::NotModified { etag: listing.etag });
            }
        }
        Ok(ListOutcome::Listed(listing))
    }

    /// Deletes one document, honoring `If-Match`, and cascades through
    /// ancestors that the removal emptied.
    pub async fn delete_document(
        &self,
        user: &str,
        path: &str,
        preconditions: &Preconditions,
    ) -> Result<DeleteReceipt> {
        if paths::validate_document(path).is_err() {
            return Err(Error::NotFound(format!("no document at {path:?}")));
        }
        let Some(current) = self.tree.read_metadata(user, path).await? else {
            return Err(Error::NotFound(format!("no document at {path:?}")));
        };
        if let Some(header) = preconditions.if_match.as_deref() {
            if !etag::has_wildcard(header) && !etag::any_match(header, &current.etag) {
                return Err(Error::PreconditionFailed(format!(
                    "If-Match does not cover the stored revision of {path:?}"
                )));
            }
        }

        let directory = paths::parent_of(path);
        let key = paths::leaf_name(path);
        let Some(removed) = self.tree.delete_metadata(user, directory, key).await? else {
            // Lost a race with a concurrent delete.
            return Err(Error::NotFound(format!("no document at {path:?}")));
        };

        self.quota
            .adjust(user, -(removed.size as i64), true)
            .await?;
        self.tree
            .delete_or_update_ancestors(user, directory, Utc::now().timestamp_millis())
            .await?;

        if !self.blobs.remove(&blob_path(user, path)).await? {
            tracing::warn!(user, path, "blob was already gone at delete");
        }

        Ok(DeleteReceipt {
            etag: removed.etag,
        })
    }

    /// Resolves whether `token` may perform `needed` on `path`.
    /// Malformed grants are skipped, so one bad entry never widens or
    /// locks out the rest of a token's access.
    pub async fn authorize(
        &self,
        user: &str,
        token: &str,
        path: &str,
        needed: Permission,
    ) -> Result<bool> {
        let raw = self.index.read_scopes(user, token).await?;
        let mut grants = Vec::with_capacity(raw.len());
        for scope in &raw {
            match AuthorizationGrant::parse(scope) {
                Some(grant) => grants.push(grant),
                None => tracing::warn!(user, %scope, "skipping malformed grant"),
            }
        }
        Ok(auth::allows(&grants, path, needed))
    }

    /// Grants `grants` to `token`, replacing any previous scopes.
    pub async fn provision_token(
        &self,
        user: &str,
        token: &str,
        grants: &[AuthorizationGrant],
    ) -> Result<()> {
        let scopes = grants.iter().map(|grant| grant.to_string()).collect();
        self.index.write_scopes(user, token, scopes).await
    }

    /// Bytes currently attributed to `user`.
    pub async fn quota_used(&self, user: &str) -> Result<i64> {
        self.quota.used(user).await
    }
}

fn blob_path(user: &str, path: &str) -> String {
    format!("{user}/{path}")
}

/// `If-Match` requires the stored revision to match; against nothing it
/// fails even for `*`. `If-None-Match` forbids a match; `*` forbids any
/// stored revision at all.
fn check_write_preconditions(preconditions: &Preconditions, stored: Option<&str>) -> Result<()> {
    if let Some(header) = preconditions.if_match.as_deref() {
        let held = match stored {
            Some(tag) => etag::has_wildcard(header) || etag::any_match(header, tag),
            None => false,
        };
        if !held {
            return Err(Error::PreconditionFailed(
                "If-Match does not cover the stored revision".to_string(),
            ));
        }
    }
    if let Some(header) = preconditions.if_none_match.as_deref() {
        let violated = match stored {
            Some(tag) => etag::has_wildcard(header) || etag::any_match(header, tag),
            None => false,
        };
        if violated {
            return Err(Error::PreconditionFailed(
                "If-None-Match matched the stored revision".to_string(),
            ));
        }
    }
    Ok(())
}

fn token_ok(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

/// Accepts `type/subtype`, ignoring any parameters after `;`.
fn validate_media_type(content_type: &str) -> Result<()> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    let valid = essence
        .split_once('/')
        .is_some_and(|(kind, subtype)| token_ok(kind) && token_ok(subtype));
    if valid {
        Ok(())
    } else {
        Err(Error::UnsupportedMediaType(format!(
            "malformed media type: {content_type:?}"
        )))
    }
}
