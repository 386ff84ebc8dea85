//! Token issuance and validation tests.

use super::helpers::*;
use crate::*;
use agent_id_crypto::current_timestamp;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

fn claims_with(iss: &str, iat: u64, nbf: u64, exp: u64) -> TokenClaims {
    TokenClaims {
        iss: iss.to_string(),
        sub: uuid::Uuid::new_v4().to_string(),
        org_id: uuid::Uuid::new_v4().to_string(),
        role: Some("viewer".to_string()),
        agent_id: None,
        agent_name: None,
        token_use: TokenUse::Access,
        iat,
        nbf,
        exp,
        jti: uuid::Uuid::new_v4().to_string(),
    }
}

#[test]
fn test_new_rejects_short_secret() {
    let result = TokenService::new(TokenConfig::new(b"too-short".to_vec()));
    assert!(matches!(
        result,
        Err(TokenError::WeakSecret { min: 32, actual: 9 })
    ));
}

#[test]
fn test_new_rejects_shared_issuer() {
    let mut config = test_config();
    config.sdk_issuer = config.issuer.clone();
    assert!(matches!(
        TokenService::new(config),
        Err(TokenError::InvalidConfig(_))
    ));
}

#[test]
fn test_generate_token_pair() {
    let service = create_test_service();
    let principal = test_user();

    let pair = service.generate_token_pair(&principal).unwrap();
    assert_eq!(pair.token_type, "Bearer");
    assert_eq!(pair.expires_in, DEFAULT_ACCESS_TOKEN_TTL);
    assert_eq!(pair.refresh_expires_in, DEFAULT_REFRESH_TOKEN_TTL);

    let access = service.validate_access_token(&pair.access_token).unwrap();
    let refresh = service.validate_refresh_token(&pair.refresh_token).unwrap();

    assert_eq!(access.iss, "agent-id.test");
    assert_eq!(refresh.iss, "agent-id.test");
    assert_eq!(access.principal().unwrap(), principal);
    assert_eq!(refresh.exp - refresh.iat, DEFAULT_REFRESH_TOKEN_TTL);
    assert_ne!(access.jti, refresh.jti);
}

#[test]
fn test_generate_sdk_token_pair() {
    let service = create_test_service();
    let principal = test_agent();

    let pair = service.generate_sdk_token_pair(&principal).unwrap();
    let refresh = service.validate_refresh_token(&pair.refresh_token).unwrap();

    assert_eq!(refresh.iss, "agent-id-sdk.test");
    assert_eq!(refresh.exp - refresh.iat, DEFAULT_SDK_REFRESH_TOKEN_TTL);
    assert_eq!(service.class_of(&refresh).unwrap(), TokenClass::Sdk);
    assert_eq!(refresh.principal().unwrap(), principal);
    assert_eq!(refresh.agent_name.as_deref(), Some("billing-bot"));
}

#[test]
fn test_access_and_refresh_are_not_interchangeable() {
    let service = create_test_service();
    let pair = service.generate_token_pair(&test_user()).unwrap();

    assert!(matches!(
        service.validate_access_token(&pair.refresh_token),
        Err(TokenError::WrongTokenUse {
            expected: TokenUse::Access,
            found: TokenUse::Refresh
        })
    ));
    assert!(matches!(
        service.validate_refresh_token(&pair.access_token),
        Err(TokenError::WrongTokenUse { .. })
    ));
}

#[test]
fn test_rejects_unexpected_algorithm() {
    let service = create_test_service();
    let now = current_timestamp();
    let claims = claims_with("agent-id.test", now, now, now + 60);

    // Same secret, different HMAC variant
    let token = encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap();

    assert!(matches!(
        service.validate_token(&token),
        Err(TokenError::InvalidAlgorithm { found }) if found == "HS512"
    ));
}

#[test]
fn test_rejects_unsigned_token() {
    let service = create_test_service();
    // {"alg":"none","typ":"JWT"}
    let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJ4In0.";
    assert!(service.validate_token(token).is_err());
}

#[test]
fn test_rejects_expired_token() {
    let service = create_test_service();
    let now = current_timestamp();
    let claims = claims_with("agent-id.test", now - 120, now - 120, now - 60);
    let token = service.sign(&claims).unwrap();

    assert!(matches!(
        service.validate_token(&token),
        Err(TokenError::TokenExpired)
    ));
}

#[test]
fn test_rejects_not_yet_valid_token() {
    let service = create_test_service();
    let now = current_timestamp();
    let claims = claims_with("agent-id.test", now, now + 600, now + 1200);
    let token = service.sign(&claims).unwrap();

    assert!(matches!(
        service.validate_token(&token),
        Err(TokenError::TokenNotYetValid)
    ));
}

#[test]
fn test_rejects_foreign_issuer() {
    let service = create_test_service();
    let now = current_timestamp();
    let token = service
        .sign(&claims_with("someone-else", now, now, now + 60))
        .unwrap();

    assert!(matches!(
        service.validate_token(&token),
        Err(TokenError::InvalidIssuer)
    ));
}

#[test]
fn test_rejects_token_signed_with_other_secret() {
    let service = create_test_service();
    let mut other_config = test_config();
    other_config.secret = zeroize::Zeroizing::new(vec![7u8; 32]);
    let other = TokenService::new(other_config).unwrap();

    let pair = other.generate_token_pair(&test_user()).unwrap();
    assert!(matches!(
        service.validate_token(&pair.access_token),
        Err(TokenError::InvalidToken(_))
    ));
}

#[test]
fn test_get_token_id_without_verification() {
    let service = create_test_service();
    let now = current_timestamp();

    // Expired and from a foreign issuer: still readable for revocation lookups
    let claims = claims_with("someone-else", now - 120, now - 120, now - 60);
    let token = service.sign(&claims).unwrap();

    assert_eq!(service.get_token_id(&token).unwrap(), claims.jti);
    assert!(service.get_token_id("not-a-token").is_err());
}

#[test]
fn test_claims_without_principal_fields_are_malformed() {
    let now = current_timestamp();
    let mut claims = claims_with("agent-id.test", now, now, now + 60);
    claims.role = None;

    assert!(matches!(
        claims.principal(),
        Err(TokenError::MalformedClaims(_))
    ));
}
