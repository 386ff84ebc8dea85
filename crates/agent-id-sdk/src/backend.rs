//! Backend seam for key status and rotation submission.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{Result, SdkError};
use crate::signing::SignedActionRequest;

/// Backend view of an agent's key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStatusReport {
    pub agent_id: Uuid,
    pub key_status: String,
    /// Base64 key of record
    pub public_key: String,
    pub key_created_at: u64,
    pub key_expires_at: u64,
    pub days_until_expiry: i64,
    pub should_rotate: bool,
    pub in_grace_period: bool,
    pub previous_key_grace_until: Option<u64>,
    pub rotation_count: u32,
}

/// Signed request to replace the agent's key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSubmission {
    #[serde(skip)]
    pub agent_id: Uuid,
    pub new_public_key: String,
    pub timestamp: u64,
    /// Base64 signature by the current key
    pub signature: String,
}

/// Backend acknowledgement of an accepted rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationAck {
    pub agent_id: Uuid,
    pub public_key: String,
    pub key_created_at: u64,
    pub key_expires_at: u64,
    pub rotation_count: u32,
    pub previous_key_grace_until: Option<u64>,
    pub rotated_at: u64,
}

/// Decision returned for a signed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub verification_id: Uuid,
    pub status: String,
    pub denial_reason: Option<String>,
    #[serde(default)]
    pub alerted: bool,
    pub trust_score_before: f64,
    pub trust_score_after: f64,
}

impl VerificationOutcome {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

/// What the rotation agent needs from the backend
#[async_trait]
pub trait KeyBackend: Send + Sync {
    async fn key_status(&self, agent_id: Uuid) -> Result<KeyStatusReport>;

    async fn submit_rotation(&self, submission: &RotationSubmission) -> Result<RotationAck>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenPairBody {
    access_token: String,
    refresh_token: String,
}

#[derive(Default)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

/// HTTP client for the agent-id server
///
/// Authenticated calls use the SDK access token; on a 401 the refresh token
/// is exchanged once and the call retried.
pub struct HttpBackend {
    base_url: String,
    client: Client,
    tokens: RwLock<Tokens>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            tokens: RwLock::new(Tokens::default()),
        })
    }

    pub fn with_tokens(self, access_token: Option<String>, refresh_token: Option<String>) -> Self {
        *self.tokens.write() = Tokens {
            access: access_token,
            refresh: refresh_token,
        };
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a signed action for verification
    pub async fn verify_action(
        &self,
        request: &SignedActionRequest,
    ) -> Result<VerificationOutcome> {
        let response = self
            .client
            .post(format!("{}/v1/actions/verify", self.base_url))
            .json(request)
            .send()
            .await?;
        parse(response).await
    }

    async fn send_authenticated<T: DeserializeOwned>(
        &self,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<T> {
        let access = self.tokens.read().access.clone().ok_or(SdkError::MissingToken)?;
        let response = build(&self.client).bearer_auth(&access).send().await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return parse(response).await;
        }

        let refresh = self.tokens.read().refresh.clone();
        let Some(refresh) = refresh else {
            return parse(response).await;
        };
        debug!("Access token rejected, refreshing");
        let access = self.refresh(&refresh).await?;
        let response = build(&self.client).bearer_auth(&access).send().await?;
        parse(response).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/auth/refresh", self.base_url))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let pair: TokenPairBody = parse(response).await?;

        let mut tokens = self.tokens.write();
        tokens.access = Some(pair.access_token.clone());
        tokens.refresh = Some(pair.refresh_token);
        info!("SDK tokens refreshed");
        Ok(pair.access_token)
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => (parsed.error.code, parsed.error.message),
        Err(_) => ("UNKNOWN".to_string(), body),
    };
    Err(SdkError::Backend {
        status: status.as_u16(),
        code,
        message,
    })
}

#[async_trait]
impl KeyBackend for HttpBackend {
    async fn key_status(&self, agent_id: Uuid) -> Result<KeyStatusReport> {
        let url = format!("{}/v1/agents/{}/key-status", self.base_url, agent_id);
        self.send_authenticated(|client| client.get(&url)).await
    }

    async fn submit_rotation(&self, submission: &RotationSubmission) -> Result<RotationAck> {
        let response = self
            .client
            .post(format!(
                "{}/v1/agents/{}/rotate",
                self.base_url, submission.agent_id
            ))
            .json(submission)
            .send()
            .await?;
        parse(response).await
    }
}
