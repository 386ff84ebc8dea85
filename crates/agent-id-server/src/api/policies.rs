use agent_id_policy::{
    EnforcementAction, NewPolicy, PolicyRule, PolicyUpdate, RiskLevel, SecurityPolicy,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::ApiError, extractors::Authenticated, state::AppState};

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreatePolicyRequest {
    pub name: String,
    pub rule: PolicyRule,
    pub enforcement_action: EnforcementAction,
    pub severity_threshold: RiskLevel,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// GET /v1/policies
pub async fn list_policies(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
) -> Result<Json<Vec<SecurityPolicy>>, ApiError> {
    let organization_id = auth.require_user()?;
    let policies = state.policies.list_policies(organization_id).await?;
    Ok(Json(policies))
}

/// POST /v1/policies
pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Json(req): Json<CreatePolicyRequest>,
) -> Result<(StatusCode, Json<SecurityPolicy>), ApiError> {
    let organization_id = auth.require_user()?;

    let policy = state
        .policies
        .create_policy(NewPolicy {
            organization_id,
            name: req.name,
            rule: req.rule,
            enforcement_action: req.enforcement_action,
            severity_threshold: req.severity_threshold,
            priority: req.priority,
            enabled: req.enabled,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(policy)))
}

/// PUT /v1/policies/:policy_id
pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(policy_id): Path<Uuid>,
    Json(update): Json<PolicyUpdate>,
) -> Result<Json<SecurityPolicy>, ApiError> {
    let organization_id = auth.require_user()?;

    let existing = state.policies.get_policy(policy_id).await?;
    if existing.organization_id != organization_id {
        return Err(ApiError::NotFound(format!("Policy not found: {}", policy_id)));
    }

    let policy = state.policies.update_policy(policy_id, update).await?;
    Ok(Json(policy))
}

/// POST /v1/policies/seed
///
/// Creates the missing default policies and returns only those created.
pub async fn seed_policies(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
) -> Result<Json<Vec<SecurityPolicy>>, ApiError> {
    let organization_id = auth.require_user()?;
    let policies = state.policies.seed_default_policies(organization_id).await?;
    Ok(Json(policies))
}
