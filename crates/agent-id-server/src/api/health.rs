use agent_id_storage::{column_families::CF_SEQUENCES, Storage};
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: &'static str,
    database: &'static str,
}

/// Readiness check endpoint, probes the database
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match state
        .storage
        .exists(CF_SEQUENCES, &"readiness".to_string())
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                database: "connected",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "unavailable",
                    database: "error",
                }),
            )
        }
    }
}
