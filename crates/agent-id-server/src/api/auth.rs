use agent_id_tokens::TokenPair;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
}

/// POST /v1/auth/refresh
///
/// The presented refresh token is revoked as part of the exchange.
pub async fn refresh_tokens(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state
        .revocations
        .rotate(&state.tokens, &req.refresh_token)
        .await?;
    Ok(Json(pair))
}

/// POST /v1/auth/revoke
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RevokeRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .revocations
        .revoke_token(&state.tokens, &req.token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
