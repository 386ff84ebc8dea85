//! Token service implementation.

mod issue;
mod validate;

use crate::{errors::*, types::*};
use jsonwebtoken::{DecodingKey, EncodingKey};

/// Issues and validates HS256 tokens
///
/// Holds only the signing secret and configuration; every operation is
/// read-only and safe to call concurrently.
pub struct TokenService {
    pub(super) config: TokenConfig,
    pub(super) encoding_key: EncodingKey,
    pub(super) decoding_key: DecodingKey,
}

impl TokenService {
    /// Create a token service
    ///
    /// Fails when the secret is shorter than 32 bytes or the issuers collide.
    pub fn new(config: TokenConfig) -> Result<Self> {
        config.validate()?;

        let encoding_key = EncodingKey::from_secret(&config.secret);
        let decoding_key = DecodingKey::from_secret(&config.secret);

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    pub fn sdk_issuer(&self) -> &str {
        &self.config.sdk_issuer
    }

    /// Determine the token class from an issuer claim
    pub fn class_of(&self, claims: &TokenClaims) -> Result<TokenClass> {
        if claims.iss == self.config.sdk_issuer {
            Ok(TokenClass::Sdk)
        } else if claims.iss == self.config.issuer {
            Ok(TokenClass::Interactive)
        } else {
            Err(TokenError::InvalidIssuer)
        }
    }

    pub(super) fn issuer_for(&self, class: TokenClass) -> &str {
        match class {
            TokenClass::Interactive => &self.config.issuer,
            TokenClass::Sdk => &self.config.sdk_issuer,
        }
    }

    pub(super) fn refresh_ttl_for(&self, class: TokenClass) -> u64 {
        match class {
            TokenClass::Interactive => self.config.refresh_token_ttl,
            TokenClass::Sdk => self.config.sdk_refresh_token_ttl,
        }
    }
}
