//! File-versus-directory collision detection.
//!
//! A path may name a document or a directory, never both. Writing
//! `food/tacos` therefore conflicts with an existing `food/tacos/`
//! directory, and with an existing `food` document that the write would
//! silently turn into a directory.

use std::sync::Arc;

use bodega_core::{CollisionProbe, IndexStore, Result};

#[derive(Debug, Clone)]
pub struct CollisionDetector {
    index: Arc<dyn IndexStore>,
}

impl CollisionDetector {
    pub fn new(index: Arc<dyn IndexStore>) -> CollisionDetector {
        CollisionDetector { index }
    }

    /// True when writing document `key` inside `directory` would make
    /// some path both a document and a directory.
    pub async fn check(&self, user: &str, directory: &str, key: &str) -> Result<bool> {
        self.index
            .check_collision(user, CollisionProbe::for_write(directory, key))
            .await
    }
}
