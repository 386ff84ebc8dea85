//! Agent registry trait definitions.

use crate::{errors::Result, types::*};
use agent_id_crypto::{AgentKeyPair, Challenge, SIGNATURE_SIZE};
use agent_id_policy::{TrustEvent, TrustUpdate};
use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Exclusive hold on one agent's mutable state
///
/// Every read-modify-write of an agent record happens under this guard, so
/// concurrent verifications and key rotations for the same agent serialize
/// while different agents proceed in parallel.
pub struct AgentGuard {
    agent_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl AgentGuard {
    pub(crate) fn new(agent_id: Uuid, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            agent_id,
            _guard: guard,
        }
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }
}

/// Agent registry subsystem trait
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Register a new agent
    ///
    /// A client-supplied public key starts `Pending` and comes with a
    /// proof-of-possession challenge. Without one, the server generates the
    /// key pair, seals the private key in the vault, and the agent starts
    /// `Verified`.
    async fn register_agent(&self, request: RegisterAgentRequest) -> Result<Registration>;

    /// Get agent by ID
    async fn get_agent(&self, agent_id: Uuid) -> Result<AgentIdentity>;

    /// Get agent by ID, `None` if unknown
    async fn find_agent(&self, agent_id: Uuid) -> Result<Option<AgentIdentity>>;

    /// List all agents of an organization
    async fn list_agents(&self, organization_id: Uuid) -> Result<Vec<AgentIdentity>>;

    /// Issue a single-use, time-boxed proof-of-possession challenge
    async fn issue_challenge(&self, agent_id: Uuid) -> Result<Challenge>;

    /// Answer a challenge with a signature by the agent's current key
    async fn verify_challenge(
        &self,
        challenge_id: Uuid,
        signature: &[u8; SIGNATURE_SIZE],
    ) -> Result<AgentIdentity>;

    /// Expiry and rotation status of the agent's current key
    async fn key_status(&self, agent_id: Uuid) -> Result<KeyStatusReport>;

    /// Replace the agent's public key, keeping the prior one for the grace window
    async fn rotate_key(&self, request: KeyRotationRequest) -> Result<RotationReceipt>;

    /// Temporarily bar the agent from acting
    async fn suspend_agent(&self, agent_id: Uuid) -> Result<AgentIdentity>;

    /// Lift a suspension
    async fn reactivate_agent(&self, agent_id: Uuid) -> Result<AgentIdentity>;

    /// Permanently bar the agent and destroy any server-held key
    async fn revoke_agent(&self, agent_id: Uuid) -> Result<AgentIdentity>;

    /// Open the server-held private key for bundle issuance
    async fn issue_credentials(&self, agent_id: Uuid) -> Result<(AgentIdentity, AgentKeyPair)>;

    /// Acquire the per-agent lock
    async fn lock_agent(&self, agent_id: Uuid) -> AgentGuard;

    /// Store a trust score update and its history entries
    ///
    /// The guard proves the caller read the score it is updating under the
    /// same lock.
    async fn record_trust_update(
        &self,
        guard: &AgentGuard,
        update: TrustUpdate,
        events: &[TrustEvent],
        verification_id: Option<Uuid>,
        verified_at: Option<u64>,
    ) -> Result<AgentIdentity>;
}
