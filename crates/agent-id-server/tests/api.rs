use agent_id_crypto::{
    canonicalize_action_message, canonicalize_rotation_message, current_timestamp,
    decode_private_key, encode_public_key, encode_signature, sign_message, AgentKeyPair,
};
use agent_id_server::{create_router, AppState, Config};
use agent_id_storage::RocksDbStorage;
use agent_id_tokens::Principal;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn test_config() -> Config {
    Config::from_lookup(|name| match name {
        "VAULT_MASTER_KEY" => Some("11".repeat(32)),
        "JWT_SECRET" => Some("integration-test-secret-0123456789abcdef".to_string()),
        "PUBLIC_URL" => Some("https://agents.example.test".to_string()),
        _ => None,
    })
    .unwrap()
}

fn test_state() -> Arc<AppState> {
    let storage = Arc::new(RocksDbStorage::open_test().unwrap());
    Arc::new(AppState::with_storage(test_config(), storage).unwrap())
}

fn user_token(state: &AppState, organization_id: Uuid) -> String {
    state
        .tokens
        .generate_token_pair(&Principal::User {
            user_id: Uuid::new_v4(),
            organization_id,
            role: "admin".to_string(),
        })
        .unwrap()
        .access_token
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Register a server-keyed agent and download its bundle
async fn agent_with_bundle(app: &Router, token: &str) -> (Uuid, AgentKeyPair, Value) {
    let (status, body) = send(
        app,
        Method::POST,
        "/v1/agents",
        Some(token),
        Some(json!({ "name": "billing-bot", "capabilities": ["read", "write"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["agent"]["key_status"], "verified");
    assert!(body.get("challenge").is_none());

    let agent_id: Uuid = body["agent"]["agent_id"].as_str().unwrap().parse().unwrap();
    let (status, bundle) = send(
        app,
        Method::GET,
        &format!("/v1/agents/{}/bundle", agent_id),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let keypair = decode_private_key(bundle["bundle"]["private_key"].as_str().unwrap()).unwrap();
    (agent_id, keypair, bundle)
}

fn signed_action(agent_id: Uuid, keypair: &AgentKeyPair, nonce: &str, resource: &str) -> Value {
    let timestamp = current_timestamp();
    let message = canonicalize_action_message(&agent_id, timestamp, nonce, "read", resource);
    json!({
        "verification_id": Uuid::new_v4(),
        "agent_id": agent_id,
        "action_type": "read",
        "resource": resource,
        "risk_level": "low",
        "nonce": nonce,
        "timestamp": timestamp,
        "signature": encode_signature(&sign_message(keypair, &message)),
    })
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = create_router(test_state());

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = create_router(test_state());

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/agents",
        None,
        Some(json!({ "name": "anon" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, Method::GET, "/v1/agents", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_client_key_registration_with_proof_of_possession() {
    let state = test_state();
    let app = create_router(state.clone());
    let token = user_token(&state, Uuid::new_v4());
    let keypair = AgentKeyPair::generate().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/agents",
        Some(&token),
        Some(json!({
            "name": "client-keyed",
            "public_key": encode_public_key(&keypair.public_key_bytes()),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["agent"]["key_status"], "pending");

    let challenge_id = body["challenge"]["challenge_id"].as_str().unwrap().to_string();
    let message = STANDARD
        .decode(body["challenge"]["message"].as_str().unwrap())
        .unwrap();
    assert_eq!(message.len(), 81);

    // Wrong key first: the challenge is consumed
    let other = AgentKeyPair::generate().unwrap();
    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/agents/challenge/verify",
        None,
        Some(json!({
            "challenge_id": challenge_id,
            "signature": encode_signature(&sign_message(&other, &message)),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let agent_id = body["agent"]["agent_id"].as_str().unwrap().to_string();
    let (status, challenge) = send(
        &app,
        Method::POST,
        &format!("/v1/agents/{}/challenge", agent_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let message = STANDARD
        .decode(challenge["message"].as_str().unwrap())
        .unwrap();
    let (status, agent) = send(
        &app,
        Method::POST,
        "/v1/agents/challenge/verify",
        None,
        Some(json!({
            "challenge_id": challenge["challenge_id"],
            "signature": encode_signature(&sign_message(&keypair, &message)),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent["key_status"], "verified");

    // Client-held keys are never downloadable
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/v1/agents/{}/bundle", agent_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_bundle_contents_and_sdk_token() {
    let state = test_state();
    let app = create_router(state.clone());
    let token = user_token(&state, Uuid::new_v4());

    let (agent_id, keypair, body) = agent_with_bundle(&app, &token).await;
    let bundle = &body["bundle"];

    assert_eq!(bundle["agent_id"], agent_id.to_string());
    assert_eq!(
        bundle["public_key"],
        encode_public_key(&keypair.public_key_bytes())
    );
    assert_eq!(bundle["backend_url"], "https://agents.example.test");
    assert_eq!(bundle["status"], "verified");
    assert_eq!(bundle["trust_score"], 50.0);
    assert!(bundle["registered_at"].as_u64().is_some());
    assert!(bundle.get("rotation_count").is_none());

    // The SDK token acts as the agent: its own record, nothing else
    let sdk_token = body["tokens"]["access_token"].as_str().unwrap();
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/v1/agents/{}/key-status", agent_id),
        Some(sdk_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/v1/agents", Some(sdk_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_verify_action_and_fetch_result() {
    let state = test_state();
    let app = create_router(state.clone());
    let organization_id = Uuid::new_v4();
    let token = user_token(&state, organization_id);
    let (agent_id, keypair, _) = agent_with_bundle(&app, &token).await;

    let request = signed_action(agent_id, &keypair, "nonce-1", "reports/q3");
    let (status, result) = send(
        &app,
        Method::POST,
        "/v1/actions/verify",
        None,
        Some(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], "approved");

    // Same verification id returns the stored decision
    let (status, again) = send(&app, Method::POST, "/v1/actions/verify", None, Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, result);

    // A fresh id reusing the nonce is a replay
    let mut replay = signed_action(agent_id, &keypair, "nonce-1", "reports/q3");
    replay["verification_id"] = json!(Uuid::new_v4());
    let (_, denied) = send(&app, Method::POST, "/v1/actions/verify", None, Some(replay)).await;
    assert_eq!(denied["status"], "denied");
    assert_eq!(denied["denial_reason"], "replayed_nonce");

    let uri = format!("/v1/verifications/{}", result["verification_id"].as_str().unwrap());
    let (status, fetched) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["agent_id"], agent_id.to_string());

    let outsider = user_token(&state, Uuid::new_v4());
    let (status, _) = send(&app, Method::GET, &uri, Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, entries) = send(
        &app,
        Method::GET,
        &format!("/v1/agents/{}/audit", agent_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_and_unknown_action_requests() {
    let state = test_state();
    let app = create_router(state.clone());
    let token = user_token(&state, Uuid::new_v4());
    let (agent_id, keypair, _) = agent_with_bundle(&app, &token).await;

    let mut request = signed_action(agent_id, &keypair, "n", "db");
    request["signature"] = json!("AAAA");
    let (status, body) = send(&app, Method::POST, "/v1/actions/verify", None, Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    let unknown = signed_action(Uuid::new_v4(), &keypair, "n", "db");
    let (status, _) = send(&app, Method::POST, "/v1/actions/verify", None, Some(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_suspended_agent_is_denied() {
    let state = test_state();
    let app = create_router(state.clone());
    let token = user_token(&state, Uuid::new_v4());
    let (agent_id, keypair, _) = agent_with_bundle(&app, &token).await;

    let (status, agent) = send(
        &app,
        Method::POST,
        &format!("/v1/agents/{}/suspend", agent_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent["key_status"], "suspended");

    let request = signed_action(agent_id, &keypair, "after-suspend", "db");
    let (_, result) = send(&app, Method::POST, "/v1/actions/verify", None, Some(request)).await;
    assert_eq!(result["status"], "denied");
    assert_eq!(result["denial_reason"], "agent_suspended");

    // Another organization sees nothing
    let outsider = user_token(&state, Uuid::new_v4());
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/v1/agents/{}/reactivate", agent_id),
        Some(&outsider),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_key_rotation_over_http() {
    let state = test_state();
    let app = create_router(state.clone());
    let token = user_token(&state, Uuid::new_v4());
    let (agent_id, old_key, _) = agent_with_bundle(&app, &token).await;

    let new_key = AgentKeyPair::generate().unwrap();
    let timestamp = current_timestamp();
    let message =
        canonicalize_rotation_message(&agent_id, &new_key.public_key_bytes(), timestamp);
    let body = json!({
        "new_public_key": encode_public_key(&new_key.public_key_bytes()),
        "timestamp": timestamp,
        "signature": encode_signature(&sign_message(&old_key, &message)),
    });

    let uri = format!("/v1/agents/{}/rotate", agent_id);
    let (status, receipt) = send(&app, Method::POST, &uri, None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["rotation_count"], 1);
    assert!(receipt["previous_key_grace_until"].as_u64().is_some());

    // Resubmission after a lost acknowledgement
    let (status, again) = send(&app, Method::POST, &uri, None, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["public_key"], receipt["public_key"]);

    let (status, key) = send(
        &app,
        Method::GET,
        &format!("/v1/agents/{}/key", agent_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(key["public_key"], encode_public_key(&new_key.public_key_bytes()));
    assert_eq!(
        key["grace_public_key"],
        encode_public_key(&old_key.public_key_bytes())
    );

    // Requests signed with the old key still verify during the grace window
    let request = signed_action(agent_id, &old_key, "grace", "db");
    let (_, result) = send(&app, Method::POST, "/v1/actions/verify", None, Some(request)).await;
    assert_eq!(result["status"], "approved");

    // A forged rotation is rejected
    let intruder = AgentKeyPair::generate().unwrap();
    let message =
        canonicalize_rotation_message(&agent_id, &intruder.public_key_bytes(), timestamp);
    let (status, _) = send(
        &app,
        Method::POST,
        &uri,
        None,
        Some(json!({
            "new_public_key": encode_public_key(&intruder.public_key_bytes()),
            "timestamp": timestamp,
            "signature": encode_signature(&sign_message(&intruder, &message)),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_rotation_and_revocation() {
    let state = test_state();
    let app = create_router(state.clone());
    let pair = state
        .tokens
        .generate_token_pair(&Principal::User {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role: "admin".to_string(),
        })
        .unwrap();

    let (status, refreshed) = send(
        &app,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": pair.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(refreshed["access_token"].as_str().is_some());

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": pair.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let access = refreshed["access_token"].as_str().unwrap();
    let (status, _) = send(&app, Method::GET, "/v1/agents", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/auth/revoke",
        None,
        Some(json!({ "token": access })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/v1/agents", Some(access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_policy_management() {
    let state = test_state();
    let app = create_router(state.clone());
    let token = user_token(&state, Uuid::new_v4());

    let (status, seeded) = send(&app, Method::POST, "/v1/policies/seed", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let seeded_count = seeded.as_array().unwrap().len();
    assert!(seeded_count > 0);

    let (_, again) = send(&app, Method::POST, "/v1/policies/seed", Some(&token), None).await;
    assert!(again.as_array().unwrap().is_empty());

    let (status, policy) = send(
        &app,
        Method::POST,
        "/v1/policies",
        Some(&token),
        Some(json!({
            "name": "no-production",
            "rule": { "restricted_resource": { "prefixes": ["prod/"] } },
            "enforcement_action": "block_and_alert",
            "severity_threshold": "low",
            "priority": 100,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(policy["enabled"], true);

    let (_, listed) = send(&app, Method::GET, "/v1/policies", Some(&token), None).await;
    assert_eq!(listed.as_array().unwrap().len(), seeded_count + 1);

    let uri = format!("/v1/policies/{}", policy["policy_id"].as_str().unwrap());
    let (status, updated) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["enabled"], false);

    let outsider = user_token(&state, Uuid::new_v4());
    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&outsider),
        Some(json!({ "enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/policies",
        Some(&token),
        Some(json!({
            "name": "bad",
            "rule": { "low_trust_score": { "min_score": 150.0 } },
            "enforcement_action": "alert_only",
            "severity_threshold": "low",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_restricted_resource_blocks_action() {
    let state = test_state();
    let app = create_router(state.clone());
    let token = user_token(&state, Uuid::new_v4());
    let (agent_id, keypair, _) = agent_with_bundle(&app, &token).await;

    send(
        &app,
        Method::POST,
        "/v1/policies",
        Some(&token),
        Some(json!({
            "name": "no-production",
            "rule": { "restricted_resource": { "prefixes": ["prod/"] } },
            "enforcement_action": "block_and_alert",
            "severity_threshold": "low",
        })),
    )
    .await;

    let request = signed_action(agent_id, &keypair, "p1", "prod/db");
    let (_, result) = send(&app, Method::POST, "/v1/actions/verify", None, Some(request)).await;
    assert_eq!(result["status"], "denied");
    assert_eq!(result["denial_reason"], "policy_violation");

    let (status, alerts) = send(&app, Method::GET, "/v1/alerts", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["blocking"], true);
    assert_eq!(alerts[0]["policy_name"], "no-production");
}
