//! Agent lifecycle: suspend, reactivate, revoke.

use crate::{errors::*, types::*};
use agent_id_storage::{
    column_families::{CF_AGENTS, CF_PRIVATE_KEYS},
    BatchExt, Storage,
};
use tracing::info;
use uuid::Uuid;

use super::AgentRegistryService;

impl<S: Storage + 'static> AgentRegistryService<S> {
    pub(super) async fn suspend_agent_internal(&self, agent_id: Uuid) -> Result<AgentIdentity> {
        let _guard = self.acquire(agent_id).await;
        let mut agent = self.load_agent(agent_id).await?;

        if agent.key_status != KeyStatus::Verified {
            return Err(RegistryError::InvalidKeyStatus {
                status: agent.key_status,
                reason: "only verified agents can be suspended".to_string(),
            });
        }

        agent.key_status = KeyStatus::Suspended;
        self.store_agent(&agent).await?;

        info!(agent_id = %agent_id, "Agent suspended");
        Ok(agent)
    }

    pub(super) async fn reactivate_agent_internal(&self, agent_id: Uuid) -> Result<AgentIdentity> {
        let _guard = self.acquire(agent_id).await;
        let mut agent = self.load_agent(agent_id).await?;

        if agent.key_status != KeyStatus::Suspended {
            return Err(RegistryError::InvalidKeyStatus {
                status: agent.key_status,
                reason: "agent is not suspended".to_string(),
            });
        }

        agent.key_status = KeyStatus::Verified;
        self.store_agent(&agent).await?;

        info!(agent_id = %agent_id, "Agent reactivated");
        Ok(agent)
    }

    pub(super) async fn revoke_agent_internal(&self, agent_id: Uuid) -> Result<AgentIdentity> {
        let _guard = self.acquire(agent_id).await;
        let mut agent = self.load_agent(agent_id).await?;

        if agent.key_status == KeyStatus::Revoked {
            return Err(RegistryError::InvalidKeyStatus {
                status: agent.key_status,
                reason: "agent already revoked".to_string(),
            });
        }

        agent.key_status = KeyStatus::Revoked;
        agent.server_held_key = false;
        agent.previous_public_key = None;
        agent.previous_key_grace_until = None;

        let _vault = self.vault.read().await;
        let mut batch = self.storage.batch();
        batch.put(CF_AGENTS, &agent_id, &agent)?;
        batch.delete(CF_PRIVATE_KEYS, &agent_id)?;
        batch.commit().await?;

        info!(agent_id = %agent_id, "Agent revoked");
        Ok(agent)
    }
}
