//! Action signing through a swappable key handle.

use agent_id_crypto::{
    canonicalize_action_message, current_timestamp, encode_signature, sign_message, AgentKeyPair,
    PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Shared reference to the agent's active key
///
/// Readers clone the inner `Arc` and sign outside the lock, so a rotation
/// only ever waits for a pointer copy and a signer sees either the old or
/// the new key, never a mix.
#[derive(Clone)]
pub struct SigningHandle {
    agent_id: Uuid,
    current: Arc<RwLock<Arc<AgentKeyPair>>>,
}

impl std::fmt::Debug for SigningHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningHandle")
            .field("agent_id", &self.agent_id)
            .field("key", &*self.current())
            .finish()
    }
}

impl SigningHandle {
    pub fn new(agent_id: Uuid, keypair: AgentKeyPair) -> Self {
        Self {
            agent_id,
            current: Arc::new(RwLock::new(Arc::new(keypair))),
        }
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    /// Snapshot of the active key
    pub fn current(&self) -> Arc<AgentKeyPair> {
        Arc::clone(&self.current.read())
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.current().public_key_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        let keypair = self.current();
        sign_message(&keypair, message)
    }

    /// Install a new active key, returning the replaced one
    pub fn swap(&self, keypair: AgentKeyPair) -> Arc<AgentKeyPair> {
        std::mem::replace(&mut *self.current.write(), Arc::new(keypair))
    }

    /// Build a signed action request stamped with the current time
    pub fn sign_action(
        &self,
        action_type: &str,
        resource: &str,
        risk_level: &str,
        context: serde_json::Value,
    ) -> SignedActionRequest {
        let timestamp = current_timestamp();
        let nonce = Uuid::new_v4().simple().to_string();
        let message =
            canonicalize_action_message(&self.agent_id, timestamp, &nonce, action_type, resource);

        SignedActionRequest {
            verification_id: Uuid::new_v4(),
            agent_id: self.agent_id,
            action_type: action_type.to_string(),
            resource: resource.to_string(),
            risk_level: risk_level.to_string(),
            context,
            nonce,
            timestamp,
            signature: encode_signature(&self.sign(&message)),
        }
    }
}

/// Wire form of an action verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedActionRequest {
    pub verification_id: Uuid,
    pub agent_id: Uuid,
    pub action_type: String,
    pub resource: String,
    pub risk_level: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub nonce: String,
    pub timestamp: u64,
    pub signature: String,
}
