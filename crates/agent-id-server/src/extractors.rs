use agent_id_tokens::{Principal, TokenClaims};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Extractor for authenticated requests
///
/// Verifies the bearer access token and checks its id against the
/// revocation list.
pub struct Authenticated {
    pub claims: TokenClaims,
    pub principal: Principal,
}

impl Authenticated {
    pub fn organization_id(&self) -> Uuid {
        self.principal.organization_id()
    }

    /// Require a human principal, returning the organization
    pub fn require_user(&self) -> Result<Uuid, ApiError> {
        match &self.principal {
            Principal::User {
                organization_id, ..
            } => Ok(*organization_id),
            Principal::Agent { .. } => Err(ApiError::Forbidden(
                "operation requires a user token".to_string(),
            )),
        }
    }

    /// Allow users of the agent's organization and the agent itself
    pub fn require_access_to(&self, organization_id: Uuid, agent_id: Uuid) -> Result<(), ApiError> {
        let allowed = match &self.principal {
            Principal::User {
                organization_id: org,
                ..
            } => *org == organization_id,
            Principal::Agent {
                agent_id: own_id, ..
            } => *own_id == agent_id,
        };
        if !allowed {
            return Err(ApiError::Forbidden(
                "resource belongs to another principal".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized)?;

        let claims = state.tokens.validate_access_token(token)?;

        if state.revocations.is_revoked(&claims.jti).await? {
            tracing::warn!(jti = %claims.jti, "Revoked access token presented");
            return Err(ApiError::Unauthorized);
        }

        let principal = claims.principal()?;

        Ok(Authenticated { claims, principal })
    }
}
