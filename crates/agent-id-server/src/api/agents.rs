use agent_id_crypto::{canonicalize_challenge, encode_private_key, encode_public_key, Challenge};
use agent_id_registry::{AgentIdentity, AgentRegistry, RegisterAgentRequest, TrustEventRecord};
use agent_id_sdk::CredentialBundle;
use agent_id_tokens::{Principal, TokenPair};
use agent_id_verification::AuditEntry;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::helpers::{load_agent, load_agent_for_user, parse_capabilities, parse_public_key},
    error::ApiError,
    extractors::Authenticated,
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterAgentBody {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Base64 public key; omit to have the server generate one
    pub public_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub agent_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub public_key: String,
    pub key_status: String,
    pub key_created_at: u64,
    pub key_expires_at: u64,
    pub rotation_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_key_grace_until: Option<u64>,
    pub trust_score: f64,
    pub capabilities: Vec<String>,
    pub server_held_key: bool,
    pub created_at: u64,
    pub last_verified_at: Option<u64>,
    pub last_rotated_at: Option<u64>,
}

impl From<AgentIdentity> for AgentResponse {
    fn from(agent: AgentIdentity) -> Self {
        Self {
            agent_id: agent.agent_id,
            organization_id: agent.organization_id,
            name: agent.name,
            public_key: encode_public_key(&agent.public_key),
            key_status: agent.key_status.as_str().to_string(),
            key_created_at: agent.key_created_at,
            key_expires_at: agent.key_expires_at,
            rotation_count: agent.rotation_count,
            previous_key_grace_until: agent.previous_key_grace_until,
            trust_score: agent.trust_score,
            capabilities: agent.capabilities.into_iter().collect(),
            server_held_key: agent.server_held_key,
            created_at: agent.created_at,
            last_verified_at: agent.last_verified_at,
            last_rotated_at: agent.last_rotated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub challenge_id: Uuid,
    pub agent_id: Uuid,
    pub issued_at: u64,
    pub expires_at: u64,
    /// Base64 canonical bytes the agent must sign
    pub message: String,
}

impl From<&Challenge> for ChallengeResponse {
    fn from(challenge: &Challenge) -> Self {
        Self {
            challenge_id: challenge.challenge_id,
            agent_id: challenge.agent_id,
            issued_at: challenge.issued_at,
            expires_at: challenge.expires_at,
            message: STANDARD.encode(canonicalize_challenge(challenge)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterAgentResponse {
    pub agent: AgentResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeResponse>,
}

#[derive(Debug, Serialize)]
pub struct ListAgentsResponse {
    pub agents: Vec<AgentResponse>,
}

#[derive(Debug, Serialize)]
pub struct BundleResponse {
    pub bundle: CredentialBundle,
    pub tokens: TokenPair,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/agents
pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Json(req): Json<RegisterAgentBody>,
) -> Result<(StatusCode, Json<RegisterAgentResponse>), ApiError> {
    let organization_id = auth.require_user()?;
    let capabilities = parse_capabilities(&req.capabilities)?;
    let public_key = req
        .public_key
        .as_deref()
        .map(parse_public_key)
        .transpose()?;

    let registration = state
        .registry
        .register_agent(RegisterAgentRequest {
            organization_id,
            name: req.name,
            capabilities,
            public_key,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterAgentResponse {
            challenge: registration.challenge.as_ref().map(ChallengeResponse::from),
            agent: registration.agent.into(),
        }),
    ))
}

/// GET /v1/agents
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
) -> Result<Json<ListAgentsResponse>, ApiError> {
    let organization_id = auth.require_user()?;
    let agents = state.registry.list_agents(organization_id).await?;

    Ok(Json(ListAgentsResponse {
        agents: agents.into_iter().map(AgentResponse::from).collect(),
    }))
}

/// GET /v1/agents/:agent_id
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<AgentResponse>, ApiError> {
    let agent = load_agent(&state, &auth, agent_id).await?;
    Ok(Json(agent.into()))
}

/// POST /v1/agents/:agent_id/suspend
pub async fn suspend_agent(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<AgentResponse>, ApiError> {
    load_agent_for_user(&state, &auth, agent_id).await?;
    let agent = state.registry.suspend_agent(agent_id).await?;
    Ok(Json(agent.into()))
}

/// POST /v1/agents/:agent_id/reactivate
pub async fn reactivate_agent(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<AgentResponse>, ApiError> {
    load_agent_for_user(&state, &auth, agent_id).await?;
    let agent = state.registry.reactivate_agent(agent_id).await?;
    Ok(Json(agent.into()))
}

/// POST /v1/agents/:agent_id/revoke
pub async fn revoke_agent(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<AgentResponse>, ApiError> {
    load_agent_for_user(&state, &auth, agent_id).await?;
    let agent = state.registry.revoke_agent(agent_id).await?;
    Ok(Json(agent.into()))
}

/// GET /v1/agents/:agent_id/bundle
///
/// Returns the SDK credential bundle with a long-lived SDK token pair.
pub async fn download_bundle(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<BundleResponse>, ApiError> {
    load_agent_for_user(&state, &auth, agent_id).await?;
    let (agent, keypair) = state.registry.issue_credentials(agent_id).await?;

    let tokens = state.tokens.generate_sdk_token_pair(&Principal::Agent {
        agent_id: agent.agent_id,
        organization_id: agent.organization_id,
        agent_name: agent.name.clone(),
    })?;

    let bundle = CredentialBundle {
        agent_id: agent.agent_id,
        public_key: encode_public_key(&agent.public_key),
        private_key: encode_private_key(&keypair),
        backend_url: state.config.public_url.clone(),
        status: agent.key_status.as_str().to_string(),
        trust_score: agent.trust_score,
        registered_at: agent.created_at,
        last_rotated_at: agent.last_rotated_at,
        rotation_count: (agent.rotation_count > 0).then_some(agent.rotation_count),
    };

    tracing::info!(agent_id = %agent_id, "Credential bundle downloaded");

    Ok(Json(BundleResponse { bundle, tokens }))
}

/// GET /v1/agents/:agent_id/audit
pub async fn audit_log(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    load_agent_for_user(&state, &auth, agent_id).await?;
    let entries = state.audit.audit_entries(agent_id).await?;
    Ok(Json(entries))
}

/// GET /v1/agents/:agent_id/trust-history
pub async fn trust_history(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<Vec<TrustEventRecord>>, ApiError> {
    load_agent(&state, &auth, agent_id).await?;
    let history = state.registry.trust_history(agent_id).await?;
    Ok(Json(history))
}
