use agent_id_crypto::encode_public_key;
use agent_id_registry::{AgentRegistry, KeyRotationRequest, KeyStatusReport, RotationReceipt};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::{
        agents::{AgentResponse, ChallengeResponse},
        helpers::{load_agent, load_agent_for_user, parse_public_key, parse_signature},
    },
    error::ApiError,
    extractors::Authenticated,
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyChallengeRequest {
    pub challenge_id: Uuid,
    /// Base64 signature over the challenge message
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct KeyStatusResponse {
    pub agent_id: Uuid,
    pub key_status: String,
    pub public_key: String,
    pub key_created_at: u64,
    pub key_expires_at: u64,
    pub days_until_expiry: i64,
    pub should_rotate: bool,
    pub in_grace_period: bool,
    pub previous_key_grace_until: Option<u64>,
    pub rotation_count: u32,
}

impl From<KeyStatusReport> for KeyStatusResponse {
    fn from(report: KeyStatusReport) -> Self {
        Self {
            agent_id: report.agent_id,
            key_status: report.key_status.as_str().to_string(),
            public_key: encode_public_key(&report.public_key),
            key_created_at: report.key_created_at,
            key_expires_at: report.key_expires_at,
            days_until_expiry: report.days_until_expiry,
            should_rotate: report.should_rotate,
            in_grace_period: report.in_grace_period,
            previous_key_grace_until: report.previous_key_grace_until,
            rotation_count: report.rotation_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub agent_id: Uuid,
    pub public_key: String,
    pub key_status: String,
    pub key_expires_at: u64,
    /// Prior key, while it still verifies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RotateKeyRequest {
    pub new_public_key: String,
    pub timestamp: u64,
    /// Base64 signature by the current key over the rotation message
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct RotationReceiptResponse {
    pub agent_id: Uuid,
    pub public_key: String,
    pub key_created_at: u64,
    pub key_expires_at: u64,
    pub rotation_count: u32,
    pub previous_key_grace_until: Option<u64>,
    pub rotated_at: u64,
}

impl From<RotationReceipt> for RotationReceiptResponse {
    fn from(receipt: RotationReceipt) -> Self {
        Self {
            agent_id: receipt.agent_id,
            public_key: encode_public_key(&receipt.public_key),
            key_created_at: receipt.key_created_at,
            key_expires_at: receipt.key_expires_at,
            rotation_count: receipt.rotation_count,
            previous_key_grace_until: receipt.previous_key_grace_until,
            rotated_at: receipt.rotated_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/agents/:agent_id/challenge
pub async fn issue_challenge(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    load_agent_for_user(&state, &auth, agent_id).await?;
    let challenge = state.registry.issue_challenge(agent_id).await?;
    Ok(Json(ChallengeResponse::from(&challenge)))
}

/// POST /v1/agents/challenge/verify
///
/// Unauthenticated: the signature is the proof.
pub async fn verify_challenge(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyChallengeRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    let signature = parse_signature(&req.signature)?;
    let agent = state
        .registry
        .verify_challenge(req.challenge_id, &signature)
        .await?;
    Ok(Json(agent.into()))
}

/// GET /v1/agents/:agent_id/key-status
pub async fn key_status(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<KeyStatusResponse>, ApiError> {
    load_agent(&state, &auth, agent_id).await?;
    let report = state.registry.key_status(agent_id).await?;
    Ok(Json(report.into()))
}

/// GET /v1/agents/:agent_id/key
pub async fn get_public_key(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let agent = load_agent(&state, &auth, agent_id).await?;
    let now = agent_id_crypto::current_timestamp();

    Ok(Json(PublicKeyResponse {
        agent_id: agent.agent_id,
        public_key: encode_public_key(&agent.public_key),
        key_status: agent.key_status.as_str().to_string(),
        key_expires_at: agent.key_expires_at,
        grace_public_key: agent.grace_key(now).as_ref().map(encode_public_key),
    }))
}

/// POST /v1/agents/:agent_id/rotate
///
/// Authenticated by the signature of the current key.
pub async fn rotate_key(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<RotateKeyRequest>,
) -> Result<Json<RotationReceiptResponse>, ApiError> {
    let new_public_key = parse_public_key(&req.new_public_key)?;
    let signature = parse_signature(&req.signature)?;

    let receipt = state
        .registry
        .rotate_key(KeyRotationRequest {
            agent_id,
            new_public_key,
            timestamp: req.timestamp,
            signature,
        })
        .await?;

    Ok(Json(receipt.into()))
}
