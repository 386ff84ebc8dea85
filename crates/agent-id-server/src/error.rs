use agent_id_policy::PolicyError;
use agent_id_registry::RegistryError;
use agent_id_tokens::TokenError;
use agent_id_verification::VerificationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Challenge expired")]
    ChallengeExpired,

    #[error("Invalid signature")]
    InvalidSignature,

    /// Stored key material is unusable; the agent must be re-issued
    #[error("Key material corrupted")]
    KeyMaterialCorrupted,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid credentials".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::ChallengeExpired => (
                StatusCode::BAD_REQUEST,
                "CHALLENGE_EXPIRED",
                "Challenge has expired".to_string(),
            ),
            ApiError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                "INVALID_SIGNATURE",
                "Cryptographic signature is invalid".to_string(),
            ),
            ApiError::KeyMaterialCorrupted => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "KEY_MATERIAL_CORRUPTED",
                "Stored key material is unusable; re-issue the agent".to_string(),
            ),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: ErrorDetails {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::AgentNotFound(_) | RegistryError::ChallengeNotFound(_) => {
                ApiError::NotFound(error.to_string())
            }
            RegistryError::InvalidKeyStatus { .. }
            | RegistryError::ChallengeAlreadyUsed
            | RegistryError::KeyReuse
            | RegistryError::KeyExpired { .. }
            | RegistryError::NoServerHeldKey(_) => ApiError::Conflict(error.to_string()),
            RegistryError::ChallengeExpired => ApiError::ChallengeExpired,
            RegistryError::InvalidSignature => ApiError::InvalidSignature,
            RegistryError::StaleRotationRequest { .. }
            | RegistryError::InvalidRequest(_)
            | RegistryError::Crypto(_) => ApiError::InvalidRequest(error.to_string()),
            RegistryError::KeyMaterialCorrupted(_) => ApiError::KeyMaterialCorrupted,
            RegistryError::Storage(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(error: VerificationError) -> Self {
        match error {
            VerificationError::UnknownAgent(_) => ApiError::NotFound(error.to_string()),
            VerificationError::InvalidRequest(msg) => ApiError::InvalidRequest(msg),
            VerificationError::Registry(e) => e.into(),
            VerificationError::Storage(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(error: PolicyError) -> Self {
        match error {
            PolicyError::NotFound(_) => ApiError::NotFound(error.to_string()),
            PolicyError::InvalidPolicy(msg) => ApiError::InvalidRequest(msg),
            PolicyError::Storage(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::StorageError(e) => ApiError::Internal(e.into()),
            TokenError::WeakSecret { .. }
            | TokenError::InvalidConfig(_)
            | TokenError::Encoding(_) => ApiError::Internal(error.into()),
            other => {
                tracing::warn!(error = %other, "Token rejected");
                ApiError::Unauthorized
            }
        }
    }
}
