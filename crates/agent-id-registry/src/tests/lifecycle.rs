use super::helpers::*;
use crate::*;
use agent_id_storage::{column_families::CF_PRIVATE_KEYS, Storage};
use uuid::Uuid;

#[tokio::test]
async fn test_suspend_and_reactivate() {
    let (registry, _storage) = create_test_registry();
    let (agent, _keypair) = register_verified_agent(&registry).await;

    let suspended = registry.suspend_agent(agent.agent_id).await.unwrap();
    assert_eq!(suspended.key_status, KeyStatus::Suspended);
    assert!(!suspended.key_status.can_act());

    assert!(matches!(
        registry.suspend_agent(agent.agent_id).await,
        Err(RegistryError::InvalidKeyStatus { .. })
    ));

    let reactivated = registry.reactivate_agent(agent.agent_id).await.unwrap();
    assert_eq!(reactivated.key_status, KeyStatus::Verified);

    assert!(matches!(
        registry.reactivate_agent(agent.agent_id).await,
        Err(RegistryError::InvalidKeyStatus { .. })
    ));
}

#[tokio::test]
async fn test_revoke_destroys_server_held_key() {
    let (registry, storage) = create_test_registry();
    let agent = registry
        .register_agent_at(register_request(Uuid::new_v4(), None), NOW)
        .await
        .unwrap()
        .agent;

    let revoked = registry.revoke_agent(agent.agent_id).await.unwrap();

    assert_eq!(revoked.key_status, KeyStatus::Revoked);
    assert!(!revoked.server_held_key);
    assert!(!storage
        .exists(CF_PRIVATE_KEYS, &agent.agent_id)
        .await
        .unwrap());
    assert!(matches!(
        registry.revoke_agent(agent.agent_id).await,
        Err(RegistryError::InvalidKeyStatus { .. })
    ));
    assert!(matches!(
        registry.reactivate_agent(agent.agent_id).await,
        Err(RegistryError::InvalidKeyStatus { .. })
    ));
    assert!(matches!(
        registry.issue_challenge(agent.agent_id).await,
        Err(RegistryError::InvalidKeyStatus { .. })
    ));
}

#[tokio::test]
async fn test_lifecycle_of_unknown_agent() {
    let (registry, _storage) = create_test_registry();

    assert!(matches!(
        registry.suspend_agent(Uuid::new_v4()).await,
        Err(RegistryError::AgentNotFound(_))
    ));
}
