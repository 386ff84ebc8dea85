//! Test helpers for registry tests.

use crate::*;
use agent_id_crypto::{
    canonicalize_challenge, canonicalize_rotation_message, sign_message, AgentKeyPair, KeyVault,
};
use agent_id_storage::{RetryPolicy, RocksDbStorage};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Fixed clock for deterministic tests
pub const NOW: u64 = 1_700_000_000;

pub const DAY: u64 = 24 * 3600;

pub const MASTER_KEY: [u8; 32] = [7u8; 32];

pub type TestRegistry = AgentRegistryService<RocksDbStorage>;

/// Helper to create a registry over a throwaway database
pub fn create_test_registry() -> (TestRegistry, Arc<RocksDbStorage>) {
    let storage = Arc::new(RocksDbStorage::open_test().unwrap());
    let vault = KeyVault::new(&MASTER_KEY).unwrap();
    let config = RegistryConfig {
        retry: RetryPolicy::none(),
        ..Default::default()
    };
    (
        AgentRegistryService::new(Arc::clone(&storage), vault, config),
        storage,
    )
}

pub fn register_request(
    organization_id: Uuid,
    public_key: Option<[u8; 32]>,
) -> RegisterAgentRequest {
    RegisterAgentRequest {
        organization_id,
        name: "billing-agent".to_string(),
        capabilities: ["read".to_string(), "transfer".to_string()]
            .into_iter()
            .collect::<BTreeSet<_>>(),
        public_key,
    }
}

/// Register a client-held key and complete proof of possession
pub async fn register_verified_agent(registry: &TestRegistry) -> (AgentIdentity, AgentKeyPair) {
    let keypair = AgentKeyPair::generate().unwrap();
    let registration = registry
        .register_agent_at(
            register_request(Uuid::new_v4(), Some(keypair.public_key_bytes())),
            NOW,
        )
        .await
        .unwrap();

    let challenge = registration.challenge.unwrap();
    let signature = sign_message(&keypair, &canonicalize_challenge(&challenge));
    let agent = registry
        .verify_challenge_at(challenge.challenge_id, &signature, NOW + 1)
        .await
        .unwrap();

    (agent, keypair)
}

/// Rotation request signed by `signer`
pub fn rotation_request(
    agent_id: Uuid,
    signer: &AgentKeyPair,
    new_keypair: &AgentKeyPair,
    timestamp: u64,
) -> KeyRotationRequest {
    let new_public_key = new_keypair.public_key_bytes();
    let message = canonicalize_rotation_message(&agent_id, &new_public_key, timestamp);
    KeyRotationRequest {
        agent_id,
        new_public_key,
        timestamp,
        signature: sign_message(signer, &message),
    }
}
