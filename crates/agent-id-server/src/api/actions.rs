use agent_id_verification::{ActionVerificationRequest, PolicyAlert, VerificationResult};
use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::ApiError, extractors::Authenticated, state::AppState};

/// POST /v1/actions/verify
///
/// Authenticated by the request signature. Denials are decisions, so both
/// outcomes return 200 with the stored result.
pub async fn verify_action(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActionVerificationRequest>,
) -> Result<Json<VerificationResult>, ApiError> {
    let result = state.pipeline.verify(&req).await?;
    Ok(Json(result))
}

/// GET /v1/verifications/:verification_id
pub async fn get_verification(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(verification_id): Path<Uuid>,
) -> Result<Json<VerificationResult>, ApiError> {
    let result = state
        .pipeline
        .get_result(verification_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Verification not found: {}", verification_id)))?;

    auth.require_access_to(result.organization_id, result.agent_id)?;

    Ok(Json(result))
}

/// GET /v1/alerts
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
) -> Result<Json<Vec<PolicyAlert>>, ApiError> {
    let organization_id = auth.require_user()?;
    let alerts = state.audit.alerts(organization_id).await?;
    Ok(Json(alerts))
}
