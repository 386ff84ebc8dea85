use super::helpers::*;
use crate::*;
use agent_id_policy::{RiskLevel, TrustEvent, TrustScoreEngine};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_trust_update_and_history() {
    let (registry, _storage) = create_test_registry();
    let (agent, _keypair) = register_verified_agent(&registry).await;
    let engine = TrustScoreEngine::default();

    let events = [
        TrustEvent::Denied {
            risk_level: RiskLevel::High,
        },
        TrustEvent::PolicyViolations {
            risk_level: RiskLevel::High,
            count: 1,
        },
    ];
    let at = NOW + 10;
    let update = engine.apply_all(agent.trust_snapshot(), &events, at);
    let verification_id = Uuid::new_v4();

    let guard = registry.lock_agent(agent.agent_id).await;
    let updated = registry
        .record_trust_update(&guard, update, &events, Some(verification_id), None)
        .await
        .unwrap();
    drop(guard);

    assert!(updated.trust_score < agent.trust_score);
    assert_eq!(updated.trust_updated_at, at);
    assert_eq!(updated.last_verified_at, agent.last_verified_at);

    let history = registry.trust_history(agent.agent_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].event, events[0]);
    assert_eq!(history[1].event, events[1]);
    assert!(history
        .iter()
        .all(|r| r.verification_id == Some(verification_id)));

    let recomputed = registry
        .recompute_trust_score(agent.agent_id, &engine, at)
        .await
        .unwrap();
    // Recomputation starts from the registration snapshot
    let expected = engine.apply_all(
        agent_id_policy::TrustSnapshot {
            score: 50.0,
            updated_at: agent.created_at,
        },
        &events,
        at,
    );
    assert!((recomputed - expected.after).abs() < 1e-9);
}

#[tokio::test]
async fn test_agent_lock_is_per_agent() {
    let (registry, _storage) = create_test_registry();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let held = registry.lock_agent(a).await;
    assert_eq!(held.agent_id(), a);

    let other = tokio::time::timeout(Duration::from_millis(100), registry.lock_agent(b)).await;
    assert!(other.is_ok());

    let same = tokio::time::timeout(Duration::from_millis(100), registry.lock_agent(a)).await;
    assert!(same.is_err());

    drop(held);
    let after_release =
        tokio::time::timeout(Duration::from_millis(100), registry.lock_agent(a)).await;
    assert!(after_release.is_ok());
}
