use super::helpers::*;
use crate::*;
use agent_id_crypto::AgentKeyPair;
use std::sync::Arc;

#[tokio::test]
async fn test_key_status_rotation_due() {
    let (registry, _storage) = create_test_registry();
    let (agent, _keypair) = register_verified_agent(&registry).await;

    let fresh = registry.key_status_at(agent.agent_id, NOW).await.unwrap();
    assert!(!fresh.should_rotate);
    assert!(!fresh.in_grace_period);
    assert_eq!(fresh.days_until_expiry, 90);

    let due = registry
        .key_status_at(agent.agent_id, NOW + 83 * DAY)
        .await
        .unwrap();
    assert!(due.should_rotate);
    assert_eq!(due.days_until_expiry, 7);
}

#[tokio::test]
async fn test_rotation_keeps_prior_key_for_grace_window() {
    let (registry, _storage) = create_test_registry();
    let (agent, current) = register_verified_agent(&registry).await;
    let next = AgentKeyPair::generate().unwrap();
    let at = NOW + 100;

    let receipt = registry
        .rotate_key_at(rotation_request(agent.agent_id, &current, &next, at), at)
        .await
        .unwrap();

    assert_eq!(receipt.public_key, next.public_key_bytes());
    assert_eq!(receipt.rotation_count, 1);
    assert_eq!(receipt.previous_key_grace_until, Some(at + DAY));
    assert_eq!(receipt.key_expires_at, at + 90 * DAY);

    let rotated = registry.get_agent(agent.agent_id).await.unwrap();
    assert_eq!(rotated.previous_public_key, Some(current.public_key_bytes()));
    assert_eq!(rotated.last_rotated_at, Some(at));

    // Both keys verify inside the grace window, only the new one after it
    assert_eq!(
        rotated.verification_keys(at + DAY - 1),
        vec![next.public_key_bytes(), current.public_key_bytes()]
    );
    assert_eq!(
        rotated.verification_keys(at + DAY),
        vec![next.public_key_bytes()]
    );

    let status = registry.key_status_at(agent.agent_id, at + 10).await.unwrap();
    assert!(status.in_grace_period);
}

#[tokio::test]
async fn test_rotation_signed_by_other_key_rejected() {
    let (registry, _storage) = create_test_registry();
    let (agent, _current) = register_verified_agent(&registry).await;
    let impostor = AgentKeyPair::generate().unwrap();
    let next = AgentKeyPair::generate().unwrap();

    let result = registry
        .rotate_key_at(rotation_request(agent.agent_id, &impostor, &next, NOW), NOW)
        .await;

    assert!(matches!(result, Err(RegistryError::InvalidSignature)));
    let unchanged = registry.get_agent(agent.agent_id).await.unwrap();
    assert_eq!(unchanged.public_key, agent.public_key);
    assert_eq!(unchanged.rotation_count, 0);
}

#[tokio::test]
async fn test_stale_rotation_rejected() {
    let (registry, _storage) = create_test_registry();
    let (agent, current) = register_verified_agent(&registry).await;
    let next = AgentKeyPair::generate().unwrap();

    let result = registry
        .rotate_key_at(
            rotation_request(agent.agent_id, &current, &next, NOW),
            NOW + 301,
        )
        .await;

    assert!(matches!(
        result,
        Err(RegistryError::StaleRotationRequest { .. })
    ));
}

#[tokio::test]
async fn test_resubmitted_rotation_is_idempotent() {
    let (registry, _storage) = create_test_registry();
    let (agent, current) = register_verified_agent(&registry).await;
    let next = AgentKeyPair::generate().unwrap();
    let request = rotation_request(agent.agent_id, &current, &next, NOW);

    let first = registry.rotate_key_at(request.clone(), NOW).await.unwrap();
    let second = registry.rotate_key_at(request, NOW + 5).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        registry.get_agent(agent.agent_id).await.unwrap().rotation_count,
        1
    );
}

#[tokio::test]
async fn test_rotation_with_expired_key_rejected() {
    let (registry, _storage) = create_test_registry();
    let (agent, current) = register_verified_agent(&registry).await;
    let next = AgentKeyPair::generate().unwrap();
    let expired = agent.key_expires_at;

    let result = registry
        .rotate_key_at(
            rotation_request(agent.agent_id, &current, &next, expired),
            expired,
        )
        .await;

    assert!(matches!(result, Err(RegistryError::KeyExpired { .. })));
    let unchanged = registry.get_agent(agent.agent_id).await.unwrap();
    assert_eq!(unchanged.public_key, agent.public_key);
    assert_eq!(unchanged.rotation_count, 0);

    // One second earlier the same key may still hand over
    let receipt = registry
        .rotate_key_at(
            rotation_request(agent.agent_id, &current, &next, expired - 1),
            expired - 1,
        )
        .await
        .unwrap();
    assert_eq!(receipt.public_key, next.public_key_bytes());
}

#[tokio::test]
async fn test_rotation_to_current_key_rejected() {
    let (registry, _storage) = create_test_registry();
    let (agent, current) = register_verified_agent(&registry).await;

    let result = registry
        .rotate_key_at(rotation_request(agent.agent_id, &current, &current, NOW), NOW)
        .await;

    assert!(matches!(result, Err(RegistryError::KeyReuse)));
}

#[tokio::test]
async fn test_concurrent_rotations_single_winner() {
    let (registry, _storage) = create_test_registry();
    let registry = Arc::new(registry);
    let (agent, current) = register_verified_agent(&registry).await;
    let a = AgentKeyPair::generate().unwrap();
    let b = AgentKeyPair::generate().unwrap();

    let request_a = rotation_request(agent.agent_id, &current, &a, NOW);
    let request_b = rotation_request(agent.agent_id, &current, &b, NOW);

    let (ra, rb) = tokio::join!(
        registry.rotate_key_at(request_a, NOW),
        registry.rotate_key_at(request_b, NOW)
    );

    assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1);
    let stored = registry.get_agent(agent.agent_id).await.unwrap();
    assert_eq!(stored.rotation_count, 1);
    assert_eq!(stored.previous_public_key, Some(current.public_key_bytes()));
}

#[tokio::test]
async fn test_pending_agent_cannot_rotate() {
    let (registry, _storage) = create_test_registry();
    let current = AgentKeyPair::generate().unwrap();
    let registration = registry
        .register_agent_at(
            register_request(uuid::Uuid::new_v4(), Some(current.public_key_bytes())),
            NOW,
        )
        .await
        .unwrap();
    let next = AgentKeyPair::generate().unwrap();

    let result = registry
        .rotate_key_at(
            rotation_request(registration.agent.agent_id, &current, &next, NOW),
            NOW,
        )
        .await;

    assert!(matches!(
        result,
        Err(RegistryError::InvalidKeyStatus {
            status: KeyStatus::Pending,
            ..
        })
    ));
}
