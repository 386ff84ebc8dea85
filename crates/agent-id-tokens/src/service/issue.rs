//! Token issuance and refresh rotation.

use crate::{errors::*, types::*};
use agent_id_crypto::current_timestamp;
use jsonwebtoken::{encode, Algorithm, Header};
use tracing::debug;
use uuid::Uuid;

use super::TokenService;

impl TokenService {
    /// Issue an access token and an interactive refresh token
    pub fn generate_token_pair(&self, principal: &Principal) -> Result<TokenPair> {
        self.issue_pair(principal, TokenClass::Interactive)
    }

    /// Issue an access token and an SDK-embedded refresh token
    ///
    /// The refresh token carries the SDK issuer and the fixed SDK lifetime,
    /// independent of the interactive session policy.
    pub fn generate_sdk_token_pair(&self, principal: &Principal) -> Result<TokenPair> {
        self.issue_pair(principal, TokenClass::Sdk)
    }

    /// Rotate a refresh token
    ///
    /// The presented token must be a valid refresh token. The new refresh
    /// token keeps the class of the presented one. Invalidating the presented
    /// token is the caller's job, see [`crate::RevocationList::rotate`].
    pub fn refresh_token_pair(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.validate_refresh_token(refresh_token)?;
        let class = self.class_of(&claims)?;
        let principal = claims.principal()?;

        debug!(
            subject = %claims.sub,
            class = ?class,
            "Rotating refresh token"
        );

        self.issue_pair(&principal, class)
    }

    fn issue_pair(&self, principal: &Principal, class: TokenClass) -> Result<TokenPair> {
        let now = current_timestamp();
        let refresh_ttl = self.refresh_ttl_for(class);

        let access_ttl = self.config.access_token_ttl;
        let access = self.build_claims(principal, class, TokenUse::Access, now, access_ttl);
        let refresh = self.build_claims(principal, class, TokenUse::Refresh, now, refresh_ttl);

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_ttl,
            refresh_expires_in: refresh_ttl,
        })
    }

    fn build_claims(
        &self,
        principal: &Principal,
        class: TokenClass,
        token_use: TokenUse,
        now: u64,
        ttl: u64,
    ) -> TokenClaims {
        let (role, agent_id, agent_name) = match principal {
            Principal::User { role, .. } => (Some(role.clone()), None, None),
            Principal::Agent {
                agent_id,
                agent_name,
                ..
            } => (None, Some(agent_id.to_string()), Some(agent_name.clone())),
        };

        TokenClaims {
            iss: self.issuer_for(class).to_string(),
            sub: principal.subject().to_string(),
            org_id: principal.organization_id().to_string(),
            role,
            agent_id,
            agent_name,
            token_use,
            iat: now,
            nbf: now,
            exp: now + ttl,
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub(crate) fn sign(&self, claims: &TokenClaims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }
}
