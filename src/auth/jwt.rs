//! JWT token handling.
//!
//! HS256 over the Base64-decoded `JWT_SECRET`. Password login issues an
//! access token (default 24 h) and a refresh token (default 7 d); both
//! carry `sub` (username) and `tenantId`.

use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::shared::errors::{DomainError, DomainResult};

pub const DEFAULT_ACCESS_EXPIRATION_SECS: i64 = 86_400;
pub const DEFAULT_REFRESH_EXPIRATION_SECS: i64 = 604_800;

/// JWT configuration with the already-decoded signing secret.
#[derive(Clone)]
pub struct JwtConfig {
    secret: Vec<u8>,
    pub access_expiration_secs: i64,
    pub refresh_expiration_secs: i64,
    pub issuer: String,
}

impl JwtConfig {
    /// Build from the Base64-encoded secret. Malformed Base64 is a
    /// configuration error, not a runtime one.
    pub fn from_base64_secret(
        secret_b64: &str,
        access_expiration_secs: i64,
        refresh_expiration_secs: i64,
    ) -> DomainResult<Self> {
        let secret = base64::engine::general_purpose::STANDARD
            .decode(secret_b64.trim())
            .map_err(|e| DomainError::Validation(format!("JWT_SECRET is not valid Base64: {}", e)))?;
        if secret.is_empty() {
            return Err(DomainError::Validation("JWT_SECRET is empty".into()));
        }
        Ok(Self {
            secret,
            access_expiration_secs,
            refresh_expiration_secs,
            issuer: "csms-service".to_string(),
        })
    }
}

/// Whether a token authenticates requests or only refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Username
    pub sub: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub token_use: TokenUse,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    fn new(username: &str, tenant_id: &str, token_use: TokenUse, config: &JwtConfig) -> Self {
        let now = Utc::now();
        let lifetime = match token_use {
            TokenUse::Access => config.access_expiration_secs,
            TokenUse::Refresh => config.refresh_expiration_secs,
        };
        Self {
            sub: username.to_string(),
            tenant_id: tenant_id.to_string(),
            token_use,
            exp: (now + Duration::seconds(lifetime)).timestamp(),
            iat: now.timestamp(),
            iss: config.issuer.clone(),
        }
    }
}

/// The access/refresh pair returned by login.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

pub fn issue_token_pair(
    username: &str,
    tenant_id: &str,
    config: &JwtConfig,
) -> DomainResult<TokenPair> {
    let key = EncodingKey::from_secret(&config.secret);
    let access = encode(
        &Header::default(),
        &Claims::new(username, tenant_id, TokenUse::Access, config),
        &key,
    )
    .map_err(|e| DomainError::Validation(e.to_string()))?;
    let refresh = encode(
        &Header::default(),
        &Claims::new(username, tenant_id, TokenUse::Refresh, config),
        &key,
    )
    .map_err(|e| DomainError::Validation(e.to_string()))?;
    Ok(TokenPair {
        access_token: access,
        refresh_token: refresh,
        expires_in: config.access_expiration_secs,
    })
}

pub fn verify_token(token: &str, config: &JwtConfig) -> DomainResult<Claims> {
    let mut validation = Validation::default();
    validation.set_issuer(&[&config.issuer]);
    decode::<Claims>(token, &DecodingKey::from_secret(&config.secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| DomainError::Unauthorized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        // "test-secret-test-secret" base64-encoded
        JwtConfig::from_base64_secret(
            "dGVzdC1zZWNyZXQtdGVzdC1zZWNyZXQ=",
            DEFAULT_ACCESS_EXPIRATION_SECS,
            DEFAULT_REFRESH_EXPIRATION_SECS,
        )
        .unwrap()
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let config = config();
        let pair = issue_token_pair("alice", "t1", &config).unwrap();
        assert_eq!(pair.expires_in, DEFAULT_ACCESS_EXPIRATION_SECS);

        let claims = verify_token(&pair.access_token, &config).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.tenant_id, "t1");
        assert_eq!(claims.token_use, TokenUse::Access);

        let refresh = verify_token(&pair.refresh_token, &config).unwrap();
        assert_eq!(refresh.token_use, TokenUse::Refresh);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let config = config();
        let pair = issue_token_pair("alice", "t1", &config).unwrap();
        let mut token = pair.access_token;
        token.push('x');
        assert!(verify_token(&token, &config).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let pair = issue_token_pair("alice", "t1", &config()).unwrap();
        let other = JwtConfig::from_base64_secret("b3RoZXItc2VjcmV0LW90aGVyLXNlY3JldA==", 60, 60)
            .unwrap();
        assert!(verify_token(&pair.access_token, &other).is_err());
    }

    #[test]
    fn invalid_base64_secret_is_a_config_error() {
        assert!(JwtConfig::from_base64_secret("not base64!!!", 60, 60).is_err());
        assert!(JwtConfig::from_base64_secret("", 60, 60).is_err());
    }

    #[test]
    fn tenant_claim_round_trips() {
        let config = config();
        let pair = issue_token_pair("bob", "tenant-42", &config).unwrap();
        let claims = verify_token(&pair.access_token, &config).unwrap();
        assert_eq!(claims.tenant_id, "tenant-42");
    }
}
