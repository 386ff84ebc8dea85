//! Agent registry service implementation.

mod custody;
mod keys;
mod lifecycle;
mod registration;
mod trust;

use crate::{errors::*, traits::*, types::*};
use agent_id_crypto::{current_timestamp, AgentKeyPair, Challenge, KeyVault, SIGNATURE_SIZE};
use agent_id_policy::{TrustEvent, TrustUpdate};
use agent_id_storage::{column_families::CF_AGENTS, Storage};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Agent registry service implementation
pub struct AgentRegistryService<S: Storage> {
    pub(super) storage: Arc<S>,
    /// Current vault, swapped on master-key rotation
    pub(super) vault: RwLock<Arc<KeyVault>>,
    pub(super) config: RegistryConfig,
    pub(super) agent_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<S: Storage + 'static> AgentRegistryService<S> {
    /// Create a new registry over a storage backend and a loaded vault
    pub fn new(storage: Arc<S>, vault: KeyVault, config: RegistryConfig) -> Self {
        Self {
            storage,
            vault: RwLock::new(Arc::new(vault)),
            config,
            agent_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Master-key version of the current vault
    pub async fn vault_version(&self) -> u32 {
        self.vault.read().await.version()
    }

    pub(super) async fn acquire(&self, agent_id: Uuid) -> AgentGuard {
        let lock = self
            .agent_locks
            .entry(agent_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        AgentGuard::new(agent_id, lock.lock_owned().await)
    }

    pub(super) async fn load_agent(&self, agent_id: Uuid) -> Result<AgentIdentity> {
        self.storage
            .get(CF_AGENTS, &agent_id)
            .await?
            .ok_or(RegistryError::AgentNotFound(agent_id))
    }

    pub(super) async fn store_agent(&self, agent: &AgentIdentity) -> Result<()> {
        self.storage.put(CF_AGENTS, &agent.agent_id, agent).await?;
        Ok(())
    }
}

#[async_trait]
impl<S: Storage + 'static> AgentRegistry for AgentRegistryService<S> {
    async fn register_agent(&self, request: RegisterAgentRequest) -> Result<Registration> {
        self.register_agent_at(request, current_timestamp()).await
    }

    async fn get_agent(&self, agent_id: Uuid) -> Result<AgentIdentity> {
        self.load_agent(agent_id).await
    }

    async fn find_agent(&self, agent_id: Uuid) -> Result<Option<AgentIdentity>> {
        Ok(self.storage.get(CF_AGENTS, &agent_id).await?)
    }

    async fn list_agents(&self, organization_id: Uuid) -> Result<Vec<AgentIdentity>> {
        self.list_agents_internal(organization_id).await
    }

    async fn issue_challenge(&self, agent_id: Uuid) -> Result<Challenge> {
        self.issue_challenge_at(agent_id, current_timestamp()).await
    }

    async fn verify_challenge(
        &self,
        challenge_id: Uuid,
        signature: &[u8; SIGNATURE_SIZE],
    ) -> Result<AgentIdentity> {
        self.verify_challenge_at(challenge_id, signature, current_timestamp())
            .await
    }

    async fn key_status(&self, agent_id: Uuid) -> Result<KeyStatusReport> {
        self.key_status_at(agent_id, current_timestamp()).await
    }

    async fn rotate_key(&self, request: KeyRotationRequest) -> Result<RotationReceipt> {
        self.rotate_key_at(request, current_timestamp()).await
    }

    async fn suspend_agent(&self, agent_id: Uuid) -> Result<AgentIdentity> {
        self.suspend_agent_internal(agent_id).await
    }

    async fn reactivate_agent(&self, agent_id: Uuid) -> Result<AgentIdentity> {
        self.reactivate_agent_internal(agent_id).await
    }

    async fn revoke_agent(&self, agent_id: Uuid) -> Result<AgentIdentity> {
        self.revoke_agent_internal(agent_id).await
    }

    async fn issue_credentials(&self, agent_id: Uuid) -> Result<(AgentIdentity, AgentKeyPair)> {
        self.issue_credentials_internal(agent_id).await
    }

    async fn lock_agent(&self, agent_id: Uuid) -> AgentGuard {
        self.acquire(agent_id).await
    }

    async fn record_trust_update(
        &self,
        guard: &AgentGuard,
        update: TrustUpdate,
        events: &[TrustEvent],
        verification_id: Option<Uuid>,
        verified_at: Option<u64>,
    ) -> Result<AgentIdentity> {
        self.record_trust_update_internal(guard, update, events, verification_id, verified_at)
            .await
    }
}
