//! Registration and proof-of-possession challenges.

use crate::{errors::*, types::*};
use agent_id_crypto::{
    canonicalize_challenge, validate_public_key, verify_signature, AgentKeyPair, Challenge,
    SIGNATURE_SIZE,
};
use agent_id_storage::{
    column_families::{CF_AGENTS, CF_AGENTS_BY_ORG, CF_CHALLENGES, CF_PRIVATE_KEYS},
    retry_with_backoff, BatchExt, Storage,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AgentRegistryService;

impl<S: Storage + 'static> AgentRegistryService<S> {
    /// Register an agent at time `now`
    pub async fn register_agent_at(
        &self,
        request: RegisterAgentRequest,
        now: u64,
    ) -> Result<Registration> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidRequest(
                "agent name must not be empty".to_string(),
            ));
        }

        let agent_id = Uuid::new_v4();
        let (public_key, key_status, generated) = match request.public_key {
            Some(public_key) => {
                validate_public_key(&public_key)?;
                (public_key, KeyStatus::Pending, None)
            }
            None => {
                let keypair = AgentKeyPair::generate()?;
                (keypair.public_key_bytes(), KeyStatus::Verified, Some(keypair))
            }
        };

        let agent = AgentIdentity {
            agent_id,
            organization_id: request.organization_id,
            name,
            public_key,
            key_status,
            key_created_at: now,
            key_expires_at: now + self.config.key_validity_seconds,
            rotation_count: 0,
            previous_public_key: None,
            previous_key_grace_until: None,
            trust_score: self.config.initial_trust_score.clamp(0.0, 100.0),
            trust_updated_at: now,
            capabilities: request.capabilities,
            server_held_key: generated.is_some(),
            created_at: now,
            last_verified_at: None,
            last_rotated_at: None,
        };

        // Sealed under the read lock so a master-key rotation cannot miss it
        let vault = self.vault.read().await;
        let sealed = generated
            .as_ref()
            .map(|keypair| vault.seal_private_key(agent_id, keypair, now))
            .transpose()?;

        let challenge = match key_status {
            KeyStatus::Pending => Some(Challenge::new(agent_id, now)?),
            _ => None,
        };

        let agent_ref = &agent;
        let sealed_ref = sealed.as_ref();
        let challenge_ref = challenge.as_ref();
        retry_with_backoff(
            &self.config.retry,
            "register_agent",
            RegistryError::is_transient,
            move || async move {
                let mut batch = self.storage.batch();
                batch.put(CF_AGENTS, &agent_ref.agent_id, agent_ref)?;
                batch.put(
                    CF_AGENTS_BY_ORG,
                    &(agent_ref.organization_id, agent_ref.agent_id),
                    &agent_ref.agent_id,
                )?;
                if let Some(record) = sealed_ref {
                    batch.put(CF_PRIVATE_KEYS, &record.agent_id, record)?;
                }
                if let Some(challenge) = challenge_ref {
                    batch.put(CF_CHALLENGES, &challenge.challenge_id, challenge)?;
                }
                batch.commit().await?;
                Ok::<(), RegistryError>(())
            },
        )
        .await?;
        drop(vault);

        info!(
            agent_id = %agent.agent_id,
            organization_id = %agent.organization_id,
            key_status = agent.key_status.as_str(),
            server_held_key = agent.server_held_key,
            "Agent registered"
        );

        Ok(Registration { agent, challenge })
    }

    pub(super) async fn list_agents_internal(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<AgentIdentity>> {
        let index: Vec<(Vec<u8>, Uuid)> = self
            .storage
            .get_by_prefix(CF_AGENTS_BY_ORG, &organization_id)
            .await?;

        let mut agents = Vec::with_capacity(index.len());
        for (_, agent_id) in index {
            match self.storage.get::<_, AgentIdentity>(CF_AGENTS, &agent_id).await? {
                Some(agent) => agents.push(agent),
                None => debug!(agent_id = %agent_id, "Dangling agent index entry"),
            }
        }

        agents.sort_by_key(|a| (a.created_at, a.agent_id));
        Ok(agents)
    }

    /// Issue a proof-of-possession challenge at time `now`
    pub async fn issue_challenge_at(&self, agent_id: Uuid, now: u64) -> Result<Challenge> {
        let agent = self.load_agent(agent_id).await?;
        if agent.key_status == KeyStatus::Revoked {
            return Err(RegistryError::InvalidKeyStatus {
                status: agent.key_status,
                reason: "revoked agents cannot prove possession".to_string(),
            });
        }

        let challenge = Challenge::new(agent_id, now)?;
        self.storage
            .put(CF_CHALLENGES, &challenge.challenge_id, &challenge)
            .await?;

        debug!(
            agent_id = %agent_id,
            challenge_id = %challenge.challenge_id,
            "Challenge issued"
        );

        Ok(challenge)
    }

    /// Answer a challenge at time `now`
    ///
    /// The challenge is consumed before the signature is checked, so a wrong
    /// answer cannot be followed by a second attempt on the same challenge.
    pub async fn verify_challenge_at(
        &self,
        challenge_id: Uuid,
        signature: &[u8; SIGNATURE_SIZE],
        now: u64,
    ) -> Result<AgentIdentity> {
        let challenge: Challenge = self
            .storage
            .get(CF_CHALLENGES, &challenge_id)
            .await?
            .ok_or(RegistryError::ChallengeNotFound(challenge_id))?;

        let _guard = self.acquire(challenge.agent_id).await;

        // Re-read under the agent lock
        let mut challenge: Challenge = self
            .storage
            .get(CF_CHALLENGES, &challenge_id)
            .await?
            .ok_or(RegistryError::ChallengeNotFound(challenge_id))?;

        if challenge.used {
            return Err(RegistryError::ChallengeAlreadyUsed);
        }
        if challenge.is_expired(now) {
            self.storage.delete(CF_CHALLENGES, &challenge_id).await?;
            return Err(RegistryError::ChallengeExpired);
        }

        challenge.used = true;
        self.storage
            .put(CF_CHALLENGES, &challenge_id, &challenge)
            .await?;

        let mut agent = self.load_agent(challenge.agent_id).await?;
        if agent.key_status == KeyStatus::Revoked {
            return Err(RegistryError::InvalidKeyStatus {
                status: agent.key_status,
                reason: "revoked agents cannot prove possession".to_string(),
            });
        }

        let message = canonicalize_challenge(&challenge);
        if verify_signature(&agent.public_key, &message, signature).is_err() {
            warn!(
                agent_id = %agent.agent_id,
                challenge_id = %challenge_id,
                "Challenge signature rejected"
            );
            return Err(RegistryError::InvalidSignature);
        }

        if agent.key_status == KeyStatus::Pending {
            agent.key_status = KeyStatus::Verified;
        }
        agent.last_verified_at = Some(now);
        self.store_agent(&agent).await?;

        info!(
            agent_id = %agent.agent_id,
            key_status = agent.key_status.as_str(),
            "Proof of possession verified"
        );

        Ok(agent)
    }
}
