//! Persisted revocation list keyed by token id.

use crate::{
    errors::*,
    service::TokenService,
    types::{TokenPair, DEFAULT_LEEWAY},
};
use agent_id_crypto::current_timestamp;
use agent_id_storage::{column_families::CF_REVOKED_TOKENS, Storage};
use std::sync::Arc;
use tracing::{info, warn};

/// Revoked `jti` values, each stored with the token's own expiry
///
/// An entry can be purged once validation would reject the token on its
/// own, that is after its expiry plus the validation leeway.
pub struct RevocationList<S: Storage> {
    storage: Arc<S>,
    leeway: u64,
}

impl<S: Storage> RevocationList<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            leeway: DEFAULT_LEEWAY,
        }
    }

    /// Match the leeway the token service validates with
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    /// Mark a token id as revoked until `expires_at`
    ///
    /// Returns `false` if the id was already revoked.
    pub async fn revoke(&self, jti: &str, expires_at: u64) -> Result<bool> {
        let inserted = self
            .storage
            .insert_new(CF_REVOKED_TOKENS, &jti.to_string(), &expires_at)
            .await?;
        if inserted {
            info!(jti, expires_at, "Token revoked");
        }
        Ok(inserted)
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool> {
        Ok(self
            .storage
            .exists(CF_REVOKED_TOKENS, &jti.to_string())
            .await?)
    }

    /// Revoke a token given in compact form
    ///
    /// The token must validate, so only tokens this service issued can fill
    /// the list.
    pub async fn revoke_token(&self, tokens: &TokenService, token: &str) -> Result<()> {
        let claims = tokens.validate_token(token)?;
        self.revoke(&claims.jti, claims.exp).await?;
        Ok(())
    }

    /// Rotate a refresh token and invalidate the presented one
    ///
    /// The revocation list is consulted by token id before signature
    /// validation. The presented token is claimed with a write-once insert,
    /// so of two concurrent rotations with the same token only one succeeds.
    pub async fn rotate(&self, tokens: &TokenService, refresh_token: &str) -> Result<TokenPair> {
        let jti = tokens.get_token_id(refresh_token)?;
        if self.is_revoked(&jti).await? {
            warn!(jti = %jti, "Revoked refresh token presented");
            return Err(TokenError::TokenRevoked);
        }

        let claims = tokens.validate_refresh_token(refresh_token)?;
        if !self.revoke(&claims.jti, claims.exp).await? {
            warn!(jti = %claims.jti, "Refresh token reuse detected");
            return Err(TokenError::TokenRevoked);
        }

        tokens.refresh_token_pair(refresh_token)
    }

    /// Remove entries whose token can no longer validate
    pub async fn purge_expired(&self) -> Result<usize> {
        self.purge_expired_at(current_timestamp()).await
    }

    /// Remove entries whose token stopped validating before `now`
    pub async fn purge_expired_at(&self, now: u64) -> Result<usize> {
        let entries: Vec<(Vec<u8>, u64)> = self.storage.scan_all(CF_REVOKED_TOKENS).await?;

        let mut purged = 0;
        let mut batch = self.storage.batch();
        for (key, expires_at) in entries {
            if expires_at.saturating_add(self.leeway) < now {
                batch.delete_raw(CF_REVOKED_TOKENS, key)?;
                purged += 1;
            }
        }
        batch.commit().await?;

        Ok(purged)
    }
}
