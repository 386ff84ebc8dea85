use super::helpers::*;
use crate::*;
use agent_id_crypto::{AgentKeyPair, PrivateKeyRecord};
use agent_id_storage::{column_families::CF_PRIVATE_KEYS, RocksDbStorage, Storage};
use std::sync::Arc;
use uuid::Uuid;

async fn register_server_agent(registry: &TestRegistry) -> AgentIdentity {
    registry
        .register_agent_at(register_request(Uuid::new_v4(), None), NOW)
        .await
        .unwrap()
        .agent
}

async fn stored_record(storage: &RocksDbStorage, agent_id: Uuid) -> PrivateKeyRecord {
    storage
        .get(CF_PRIVATE_KEYS, &agent_id)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_issue_credentials_opens_matching_key() {
    let (registry, _storage) = create_test_registry();
    let agent = register_server_agent(&registry).await;

    let (issued, keypair) = registry.issue_credentials(agent.agent_id).await.unwrap();

    assert_eq!(issued.agent_id, agent.agent_id);
    assert_eq!(keypair.public_key_bytes(), agent.public_key);
}

#[tokio::test]
async fn test_client_held_key_is_never_issued() {
    let (registry, _storage) = create_test_registry();
    let (agent, _keypair) = register_verified_agent(&registry).await;

    assert!(matches!(
        registry.issue_credentials(agent.agent_id).await,
        Err(RegistryError::NoServerHeldKey(_))
    ));
}

#[tokio::test]
async fn test_rotation_drops_server_held_key() {
    let (registry, storage) = create_test_registry();
    let agent = register_server_agent(&registry).await;
    let (_, current) = registry.issue_credentials(agent.agent_id).await.unwrap();
    let next = AgentKeyPair::generate().unwrap();

    registry
        .rotate_key_at(rotation_request(agent.agent_id, &current, &next, NOW), NOW)
        .await
        .unwrap();

    assert!(!storage
        .exists(CF_PRIVATE_KEYS, &agent.agent_id)
        .await
        .unwrap());
    assert!(matches!(
        registry.issue_credentials(agent.agent_id).await,
        Err(RegistryError::NoServerHeldKey(_))
    ));
}

#[tokio::test]
async fn test_master_key_rotation_reseals_all_records() {
    let (registry, storage) = create_test_registry();
    let mut agents = Vec::new();
    for _ in 0..3 {
        agents.push(register_server_agent(&registry).await);
    }

    let report = registry
        .rotate_vault_master_key(&[9u8; 32])
        .await
        .unwrap();

    assert_eq!(report.new_version, 2);
    assert_eq!(report.rotated, 3);
    assert!(report.corrupted.is_empty());
    assert_eq!(registry.vault_version().await, 2);

    for agent in &agents {
        assert_eq!(stored_record(&storage, agent.agent_id).await.key_version, 2);
        let (_, keypair) = registry.issue_credentials(agent.agent_id).await.unwrap();
        assert_eq!(keypair.public_key_bytes(), agent.public_key);
    }
}

#[tokio::test]
async fn test_corrupted_record_reported_and_left_untouched() {
    let (registry, storage) = create_test_registry();
    let healthy = register_server_agent(&registry).await;
    let damaged = register_server_agent(&registry).await;

    let mut record = stored_record(&storage, damaged.agent_id).await;
    record.encrypted_key[20] ^= 0x01;
    storage
        .put(CF_PRIVATE_KEYS, &damaged.agent_id, &record)
        .await
        .unwrap();

    assert!(matches!(
        registry.issue_credentials(damaged.agent_id).await,
        Err(RegistryError::KeyMaterialCorrupted(_))
    ));

    let report = registry
        .rotate_vault_master_key(&[9u8; 32])
        .await
        .unwrap();

    assert_eq!(report.rotated, 1);
    assert_eq!(report.corrupted, vec![damaged.agent_id]);
    assert_eq!(stored_record(&storage, damaged.agent_id).await, record);
    assert!(registry.issue_credentials(healthy.agent_id).await.is_ok());
}

#[tokio::test]
async fn test_invalid_new_master_key_leaves_vault_in_place() {
    let (registry, _storage) = create_test_registry();
    let agent = register_server_agent(&registry).await;

    assert!(matches!(
        registry.rotate_vault_master_key(&[1u8; 16]).await,
        Err(RegistryError::Crypto(_))
    ));
    assert_eq!(registry.vault_version().await, 1);
    assert!(registry.issue_credentials(agent.agent_id).await.is_ok());
}

#[tokio::test]
async fn test_issue_credentials_during_master_key_rotation() {
    let (registry, _storage) = create_test_registry();
    let registry = Arc::new(registry);
    let agent = register_server_agent(&registry).await;

    let (first, rotation, second) = tokio::join!(
        registry.issue_credentials(agent.agent_id),
        registry.rotate_vault_master_key(&[9u8; 32]),
        registry.issue_credentials(agent.agent_id)
    );

    assert_eq!(rotation.unwrap().rotated, 1);
    for issued in [first, second] {
        let (_, keypair) = issued.unwrap();
        assert_eq!(keypair.public_key_bytes(), agent.public_key);
    }
}

#[tokio::test]
async fn test_master_key_rotation_does_not_restore_dropped_key() {
    let (registry, storage) = create_test_registry();
    let registry = Arc::new(registry);
    let agent = register_server_agent(&registry).await;
    let (_, current) = registry.issue_credentials(agent.agent_id).await.unwrap();
    let next = AgentKeyPair::generate().unwrap();

    let (rotated, resealed) = tokio::join!(
        registry.rotate_key_at(rotation_request(agent.agent_id, &current, &next, NOW), NOW),
        registry.rotate_vault_master_key(&[9u8; 32])
    );
    rotated.unwrap();
    resealed.unwrap();

    assert!(!storage
        .exists(CF_PRIVATE_KEYS, &agent.agent_id)
        .await
        .unwrap());
    let stored = registry.get_agent(agent.agent_id).await.unwrap();
    assert!(!stored.server_held_key);
    assert_eq!(stored.public_key, next.public_key_bytes());
}

#[tokio::test]
async fn test_master_key_rotation_skips_revoked_agent() {
    let (registry, storage) = create_test_registry();
    let registry = Arc::new(registry);
    let agent = register_server_agent(&registry).await;

    let (revoked, resealed) = tokio::join!(
        registry.revoke_agent(agent.agent_id),
        registry.rotate_vault_master_key(&[9u8; 32])
    );
    revoked.unwrap();
    resealed.unwrap();

    assert!(!storage
        .exists(CF_PRIVATE_KEYS, &agent.agent_id)
        .await
        .unwrap());
}
