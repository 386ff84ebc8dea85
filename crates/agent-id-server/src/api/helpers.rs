//! Shared API helper functions.

use agent_id_crypto::{decode_public_key, decode_signature, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use agent_id_registry::{AgentIdentity, AgentRegistry};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{error::ApiError, extractors::Authenticated, state::AppState};

/// Longest accepted capability name
const MAX_CAPABILITY_LENGTH: usize = 64;

/// Parse a base64 Ed25519 public key
pub fn parse_public_key(encoded: &str) -> Result<[u8; PUBLIC_KEY_SIZE], ApiError> {
    decode_public_key(encoded)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid public key: {}", e)))
}

/// Parse a base64 Ed25519 signature
pub fn parse_signature(encoded: &str) -> Result<[u8; SIGNATURE_SIZE], ApiError> {
    decode_signature(encoded)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid signature encoding: {}", e)))
}

/// Normalize capability names into a set
pub fn parse_capabilities(caps: &[String]) -> Result<BTreeSet<String>, ApiError> {
    let mut result = BTreeSet::new();
    for cap in caps {
        let cap = cap.trim();
        if cap.is_empty() || cap.len() > MAX_CAPABILITY_LENGTH {
            return Err(ApiError::InvalidRequest(format!(
                "Invalid capability: '{}'",
                cap
            )));
        }
        result.insert(cap.to_string());
    }
    Ok(result)
}

/// Load an agent the caller is allowed to see
pub async fn load_agent(
    state: &AppState,
    auth: &Authenticated,
    agent_id: Uuid,
) -> Result<AgentIdentity, ApiError> {
    let agent = state.registry.get_agent(agent_id).await?;
    auth.require_access_to(agent.organization_id, agent.agent_id)?;
    Ok(agent)
}

/// Load an agent the caller may administer (users of its organization)
pub async fn load_agent_for_user(
    state: &AppState,
    auth: &Authenticated,
    agent_id: Uuid,
) -> Result<AgentIdentity, ApiError> {
    let organization_id = auth.require_user()?;
    let agent = state.registry.get_agent(agent_id).await?;
    if agent.organization_id != organization_id {
        // Same response as a missing agent
        return Err(ApiError::NotFound(format!("Agent not found: {}", agent_id)));
    }
    Ok(agent)
}
