//! # agent-id-server
//!
//! HTTP API over the agent registry, policy engine, token service and
//! action verification pipeline.

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod extractors;
pub mod maintenance;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

pub use config::Config;
pub use state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health checks
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))

        // Agent registry
        .route(
            "/v1/agents",
            post(api::agents::register_agent).get(api::agents::list_agents),
        )
        .route("/v1/agents/:agent_id", get(api::agents::get_agent))
        .route("/v1/agents/:agent_id/suspend", post(api::agents::suspend_agent))
        .route("/v1/agents/:agent_id/reactivate", post(api::agents::reactivate_agent))
        .route("/v1/agents/:agent_id/revoke", post(api::agents::revoke_agent))
        .route("/v1/agents/:agent_id/bundle", get(api::agents::download_bundle))
        .route("/v1/agents/:agent_id/audit", get(api::agents::audit_log))
        .route("/v1/agents/:agent_id/trust-history", get(api::agents::trust_history))

        // Key lifecycle
        .route("/v1/agents/:agent_id/challenge", post(api::keys::issue_challenge))
        .route("/v1/agents/challenge/verify", post(api::keys::verify_challenge))
        .route("/v1/agents/:agent_id/key-status", get(api::keys::key_status))
        .route("/v1/agents/:agent_id/key", get(api::keys::get_public_key))
        .route("/v1/agents/:agent_id/rotate", post(api::keys::rotate_key))

        // Action verification
        .route("/v1/actions/verify", post(api::actions::verify_action))
        .route(
            "/v1/verifications/:verification_id",
            get(api::actions::get_verification),
        )
        .route("/v1/alerts", get(api::actions::list_alerts))

        // Tokens
        .route("/v1/auth/refresh", post(api::auth::refresh_tokens))
        .route("/v1/auth/revoke", post(api::auth::revoke_token))

        // Security policies
        .route(
            "/v1/policies",
            get(api::policies::list_policies).post(api::policies::create_policy),
        )
        .route("/v1/policies/seed", post(api::policies::seed_policies))
        .route("/v1/policies/:policy_id", put(api::policies::update_policy))

        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
