use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Token not yet valid")]
    TokenNotYetValid,

    #[error("Invalid algorithm: found {found}, expected HS256")]
    InvalidAlgorithm { found: String },

    #[error("Invalid issuer")]
    InvalidIssuer,

    #[error("Wrong token use: expected {expected:?}, found {found:?}")]
    WrongTokenUse {
        expected: crate::types::TokenUse,
        found: crate::types::TokenUse,
    },

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Signing secret too short: {actual} bytes, need at least {min}")]
    WeakSecret { min: usize, actual: usize },

    #[error("Invalid token configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed claims: {0}")]
    MalformedClaims(String),

    #[error("JWT encoding error: {0}")]
    Encoding(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] agent_id_storage::StorageError),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::TokenExpired,
            ErrorKind::ImmatureSignature => TokenError::TokenNotYetValid,
            ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
            ErrorKind::InvalidAlgorithm => TokenError::InvalidAlgorithm {
                found: "unexpected".to_string(),
            },
            _ => TokenError::InvalidToken(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TokenError>;
