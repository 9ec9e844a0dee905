//! Per-user usage accounting.

use std::sync::Arc;

use bodega_core::{IndexStore, Result};

#[derive(Debug, Clone)]
pub struct QuotaAccountant {
    index: Arc<dyn IndexStore>,
}

impl QuotaAccountant {
    pub fn new(index: Arc<dyn IndexStore>) -> QuotaAccountant {
        QuotaAccountant { index }
    }

    /// Applies a byte delta. Zero deltas are skipped unless the entry
    /// itself was created or deleted.
    pub async fn adjust(&self, user: &str, delta: i64, structural: bool) -> Result<()> {
        if delta == 0 && !structural {
            return Ok(());
        }
        let total = self.index.adjust_quota(user, delta).await?;
        tracing::debug!(user, delta, total, "quota adjusted");
        Ok(())
    }

    /// Bytes currently attributed to `user`.
    pub async fn used(&self, user: &str) -> Result<i64> {
        self.index.read_quota(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodega_index_memory::MemoryIndex;

    #[tokio::test]
    async fn tracks_deltas_per_user() {
        let quota = QuotaAccountant::new(Arc::new(MemoryIndex::new()));
        quota.adjust("ana", 10, true).await.unwrap();
        quota.adjust("ana", -4, false).await.unwrap();
        quota.adjust("ana", 0, false).await.unwrap();
        assert_eq!(quota.used("ana").await.unwrap(), 6);
        assert_eq!(quota.used("bob").await.unwrap(), 0);
    }
}
