//! Key status and server side of key rotation.

use crate::{errors::*, types::*};
use agent_id_crypto::{canonicalize_rotation_message, validate_public_key, verify_signature};
use agent_id_storage::{
    column_families::{CF_AGENTS, CF_PRIVATE_KEYS},
    retry_with_backoff, BatchExt, Storage,
};
use tracing::{info, warn};
use uuid::Uuid;

use super::AgentRegistryService;

impl<S: Storage + 'static> AgentRegistryService<S> {
    /// Key status report at time `now`
    pub async fn key_status_at(&self, agent_id: Uuid, now: u64) -> Result<KeyStatusReport> {
        let agent = self.load_agent(agent_id).await?;

        let should_rotate = agent.key_status == KeyStatus::Verified
            && now + self.config.rotation_window_seconds >= agent.key_expires_at;

        Ok(KeyStatusReport {
            agent_id,
            key_status: agent.key_status,
            public_key: agent.public_key,
            key_created_at: agent.key_created_at,
            key_expires_at: agent.key_expires_at,
            days_until_expiry: agent.days_until_expiry(now),
            should_rotate,
            in_grace_period: agent.in_grace_period(now),
            previous_key_grace_until: agent.previous_key_grace_until,
            rotation_count: agent.rotation_count,
        })
    }

    /// Accept a new public key at time `now`
    ///
    /// The request must be signed by the current key before it expires. The
    /// replaced key keeps verifying until the grace window closes, so there
    /// is never a moment without a valid key. Resubmitting an accepted
    /// rotation returns the same receipt.
    pub async fn rotate_key_at(
        &self,
        request: KeyRotationRequest,
        now: u64,
    ) -> Result<RotationReceipt> {
        let _guard = self.acquire(request.agent_id).await;
        let mut agent = self.load_agent(request.agent_id).await?;

        if agent.key_status != KeyStatus::Verified {
            return Err(RegistryError::InvalidKeyStatus {
                status: agent.key_status,
                reason: "only verified agents can rotate keys".to_string(),
            });
        }

        if now.abs_diff(request.timestamp) > self.config.rotation_request_window_seconds {
            return Err(RegistryError::StaleRotationRequest {
                timestamp: request.timestamp,
                now,
            });
        }

        let message = canonicalize_rotation_message(
            &request.agent_id,
            &request.new_public_key,
            request.timestamp,
        );

        if request.new_public_key == agent.public_key {
            // A retried submission whose acknowledgement was lost
            let accepted_before = agent
                .previous_public_key
                .map(|previous| verify_signature(&previous, &message, &request.signature).is_ok())
                .unwrap_or(false);
            if accepted_before {
                info!(agent_id = %agent.agent_id, "Rotation already applied");
                return Ok(RotationReceipt::for_agent(&agent));
            }
            return Err(RegistryError::KeyReuse);
        }

        if now >= agent.key_expires_at {
            warn!(agent_id = %agent.agent_id, "Rotation requested with an expired key");
            return Err(RegistryError::KeyExpired {
                expires_at: agent.key_expires_at,
            });
        }

        validate_public_key(&request.new_public_key)?;

        if verify_signature(&agent.public_key, &message, &request.signature).is_err() {
            warn!(agent_id = %agent.agent_id, "Rotation request signature rejected");
            return Err(RegistryError::InvalidSignature);
        }

        let drop_server_key = agent.server_held_key;

        agent.previous_public_key = Some(agent.public_key);
        agent.previous_key_grace_until = Some(now + self.config.grace_period_seconds);
        agent.public_key = request.new_public_key;
        agent.key_created_at = now;
        agent.key_expires_at = now + self.config.key_validity_seconds;
        agent.rotation_count += 1;
        agent.last_rotated_at = Some(now);
        agent.server_held_key = false;

        // Keeps a master-key rotation from re-sealing the record being dropped
        let _vault = self.vault.read().await;
        let agent_ref = &agent;
        retry_with_backoff(
            &self.config.retry,
            "rotate_key",
            RegistryError::is_transient,
            move || async move {
                let mut batch = self.storage.batch();
                batch.put(CF_AGENTS, &agent_ref.agent_id, agent_ref)?;
                // The sealed key no longer matches the active public key
                if drop_server_key {
                    batch.delete(CF_PRIVATE_KEYS, &agent_ref.agent_id)?;
                }
                batch.commit().await?;
                Ok::<(), RegistryError>(())
            },
        )
        .await?;

        info!(
            agent_id = %agent.agent_id,
            rotation_count = agent.rotation_count,
            grace_until = ?agent.previous_key_grace_until,
            "Agent key rotated"
        );

        Ok(RotationReceipt::for_agent(&agent))
    }
}
