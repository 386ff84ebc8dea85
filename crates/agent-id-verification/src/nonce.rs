//! Single-use action nonces.

use crate::errors::Result;
use agent_id_storage::{column_families::CF_USED_NONCES, Batch, Storage};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Persisted record of nonces already seen per agent
///
/// A nonce only needs to be remembered for as long as a request carrying it
/// could still pass the freshness check; after that the timestamp check
/// rejects the replay on its own.
pub struct NonceRegistry<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage + 'static> NonceRegistry<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Claim a nonce for an agent
    ///
    /// # Returns
    ///
    /// `Ok(true)` if this is the first use, `Ok(false)` on replay
    pub async fn claim(&self, agent_id: Uuid, nonce: &str, expires_at: u64) -> Result<bool> {
        let key = (agent_id, nonce.to_string());
        Ok(self
            .storage
            .insert_new(CF_USED_NONCES, &key, &expires_at)
            .await?)
    }

    /// Drop nonces whose replay window has passed
    pub async fn purge_expired(&self, now: u64) -> Result<usize> {
        let entries: Vec<(Vec<u8>, u64)> = self.storage.scan_all(CF_USED_NONCES).await?;

        let mut batch = self.storage.batch();
        let mut purged = 0;
        for (key, expires_at) in entries {
            if expires_at <= now {
                batch.delete_raw(CF_USED_NONCES, key)?;
                purged += 1;
            }
        }
        batch.commit().await?;

        if purged > 0 {
            debug!(purged, "Expired nonces purged");
        }
        Ok(purged)
    }
}
