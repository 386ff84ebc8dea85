use crate::errors::{Result, TokenError};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Default access token lifetime (15 minutes)
pub const DEFAULT_ACCESS_TOKEN_TTL: u64 = 900;

/// Default interactive refresh token lifetime (7 days)
pub const DEFAULT_REFRESH_TOKEN_TTL: u64 = 604_800;

/// Fixed lifetime of refresh tokens embedded in SDK bundles (90 days)
pub const DEFAULT_SDK_REFRESH_TOKEN_TTL: u64 = 7_776_000;

/// Clock skew tolerated on exp/nbf, in seconds
pub const DEFAULT_LEEWAY: u64 = 30;

/// Minimum HS256 secret length in bytes
pub const MIN_SECRET_LENGTH: usize = 32;

/// Who a token is issued to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A human dashboard user
    User {
        user_id: Uuid,
        organization_id: Uuid,
        role: String,
    },
    /// An agent using the SDK
    Agent {
        agent_id: Uuid,
        organization_id: Uuid,
        agent_name: String,
    },
}

impl Principal {
    pub fn subject(&self) -> Uuid {
        match self {
            Principal::User { user_id, .. } => *user_id,
            Principal::Agent { agent_id, .. } => *agent_id,
        }
    }

    pub fn organization_id(&self) -> Uuid {
        match self {
            Principal::User {
                organization_id, ..
            }
            | Principal::Agent {
                organization_id, ..
            } => *organization_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Provenance of a token pair, carried in the issuer claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    /// Issued to an interactive session
    Interactive,
    /// Embedded once into a downloadable SDK bundle
    Sdk,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub token_use: TokenUse,
    pub iat: u64,
    pub nbf: u64,
    pub exp: u64,
    pub jti: String,
}

impl TokenClaims {
    /// Rebuild the principal these claims were issued to
    pub fn principal(&self) -> Result<Principal> {
        let parse = |field: &str, value: &str| {
            Uuid::parse_str(value)
                .map_err(|e| TokenError::MalformedClaims(format!("{}: {}", field, e)))
        };

        let organization_id = parse("org_id", &self.org_id)?;

        match (&self.agent_id, &self.role) {
            (Some(agent_id), _) => Ok(Principal::Agent {
                agent_id: parse("agent_id", agent_id)?,
                organization_id,
                agent_name: self.agent_name.clone().unwrap_or_default(),
            }),
            (None, Some(role)) => Ok(Principal::User {
                user_id: parse("sub", &self.sub)?,
                organization_id,
                role: role.clone(),
            }),
            (None, None) => Err(TokenError::MalformedClaims(
                "neither role nor agent_id present".to_string(),
            )),
        }
    }
}

/// Access token plus refresh token issued together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_expires_in: u64,
}

/// Token service configuration
#[derive(Clone)]
pub struct TokenConfig {
    /// HS256 signing secret, at least 32 bytes
    pub secret: Zeroizing<Vec<u8>>,
    /// Issuer for interactive tokens
    pub issuer: String,
    /// Issuer for SDK-embedded tokens
    pub sdk_issuer: String,
    pub access_token_ttl: u64,
    pub refresh_token_ttl: u64,
    pub sdk_refresh_token_ttl: u64,
    /// Clock skew tolerated on exp/nbf, in seconds
    pub leeway: u64,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("issuer", &self.issuer)
            .field("sdk_issuer", &self.sdk_issuer)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("sdk_refresh_token_ttl", &self.sdk_refresh_token_ttl)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenConfig {
    /// Configuration with default issuers and lifetimes
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            issuer: "agent-id".to_string(),
            sdk_issuer: "agent-id-sdk".to_string(),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL,
            sdk_refresh_token_ttl: DEFAULT_SDK_REFRESH_TOKEN_TTL,
            leeway: DEFAULT_LEEWAY,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(TokenError::WeakSecret {
                min: MIN_SECRET_LENGTH,
                actual: self.secret.len(),
            });
        }
        if self.issuer.is_empty() || self.sdk_issuer.is_empty() {
            return Err(TokenError::InvalidConfig("issuers must be non-empty".to_string()));
        }
        if self.issuer == self.sdk_issuer {
            return Err(TokenError::InvalidConfig(
                "interactive and SDK issuers must differ".to_string(),
            ));
        }
        if self.access_token_ttl == 0
            || self.refresh_token_ttl == 0
            || self.sdk_refresh_token_ttl == 0
        {
            return Err(TokenError::InvalidConfig("token lifetimes must be positive".to_string()));
        }
        Ok(())
    }
}
