//! # Bodega document tree
//!
//! Per-user hierarchical document storage over two pluggable backends:
//! an index store holding the directory tree (metadata, revisions,
//! children, quota, grants) and a blob store holding raw bodies.
//!
//! ## Layers
//! 1. `tree`      – leaf writes, ancestor revision propagation, cascades.
//! 2. `collision` – file-versus-directory conflict detection.
//! 3. `listing`   – atomic directory listing assembly.
//! 4. `quota`     – per-user usage accounting.
//! 5. `engine`    – the request façade ([`Storage`]) applications use.

pub mod collision;
pub mod engine;
pub mod listing;
pub mod quota;
pub mod tree;

pub use engine::{
    DeleteReceipt, Document, GetOutcome, ListOutcome, Preconditions, PutOutcome, PutRequest,
    Storage,
};
pub use listing::{Listing, ListingEntry};
