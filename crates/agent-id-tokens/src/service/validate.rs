//! Token validation.

use crate::{errors::*, types::*};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::TokenService;

#[derive(Deserialize)]
struct TokenIdOnly {
    jti: String,
}

impl TokenService {
    /// Validate signature, issuer, expiry and not-before
    ///
    /// The header algorithm must be HS256; anything else is rejected before
    /// the signature is looked at.
    pub fn validate_token(&self, token: &str) -> Result<TokenClaims> {
        // Step 1: Parse header WITHOUT verification
        let header = decode_header(token)?;

        // Step 2: STRICT algorithm check
        if header.alg != Algorithm::HS256 {
            return Err(TokenError::InvalidAlgorithm {
                found: format!("{:?}", header.alg),
            });
        }

        // Step 3: Configure strict validation
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer, &self.config.sdk_issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = self.config.leeway;

        // Step 4: Verify signature and claims
        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &validation)?;

        Ok(token_data.claims)
    }

    /// Validate a token and require it to be an access token
    pub fn validate_access_token(&self, token: &str) -> Result<TokenClaims> {
        self.validate_with_use(token, TokenUse::Access)
    }

    /// Validate a token and require it to be a refresh token
    pub fn validate_refresh_token(&self, token: &str) -> Result<TokenClaims> {
        self.validate_with_use(token, TokenUse::Refresh)
    }

    fn validate_with_use(&self, token: &str, expected: TokenUse) -> Result<TokenClaims> {
        let claims = self.validate_token(token)?;
        if claims.token_use != expected {
            return Err(TokenError::WrongTokenUse {
                expected,
                found: claims.token_use,
            });
        }
        Ok(claims)
    }

    /// Extract the `jti` claim without verifying the signature
    ///
    /// Only suitable for cheap revocation-list lookups ahead of full validation.
    pub fn get_token_id(&self, token: &str) -> Result<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<TokenIdOnly>(token, &DecodingKey::from_secret(&[]), &validation)?;
        if data.claims.jti.is_empty() {
            return Err(TokenError::MalformedClaims("empty jti".to_string()));
        }
        Ok(data.claims.jti)
    }
}
