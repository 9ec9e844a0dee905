//! Core Bodega types and traits.
//!
//! This crate defines everything the tree engine and the pluggable
//! backends agree on:
//!
//! - The path grammar for the per-user document tree (`paths`)
//! - Revision tags and conditional-request matching (`etag`)
//! - The persisted record types (`record`)
//! - The error taxonomy and its HTTP status mapping (`error`)
//! - Authorization grants (`auth`)
//! - The [`BlobAdapter`] contract for byte storage backends (`blob`)
//! - The [`IndexStore`] contract for metadata backends, with the shared
//!   implementations of its atomic compound steps (`index`)
//!
//! Backend crates implement the two traits; `bodega_tree` composes them
//! into the storage engine. Nothing in this crate performs IO of its own.

pub mod auth;
pub mod blob;
pub mod error;
pub mod etag;
pub mod index;
pub mod paths;
pub mod record;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

// --- Core Public Surface ---

pub use auth::{AuthorizationGrant, Permission};
pub use blob::{AdapterFeatures, BlobAdapter, BlobHead, BlobObject, BlobReceipt, ChildStat};
pub use error::{Error, Result};
pub use index::{
    CascadeLevel, CascadeWave, ChildRecord, CollisionProbe, DeleteCommit, IndexStore,
    ListingSnapshot, WriteCommit,
};
pub use record::{DirRecord, MetaRecord};
