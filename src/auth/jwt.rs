//! HS256 access/refresh tokens, sent as `Authorization: Bearer <jwt>`.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Settings;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.jwt_secret,
            Duration::minutes(settings.access_token_ttl_minutes),
            Duration::hours(settings.refresh_token_ttl_hours),
        )
    }

    pub fn issue(&self, user_id: i32, token_type: TokenType) -> Result<String, ApiError> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            user_id,
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Checks signature, expiry and the token type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                debug!("Rejected JWT: {}", e);
                ApiError::InvalidToken("Token is invalid or expired".to_string())
            })?;

        if data.claims.token_type != expected {
            return Err(ApiError::InvalidToken(
                "Token has wrong type".to_string(),
            ));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new("test-secret", Duration::minutes(5), Duration::hours(24))
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let keys = keys();
        let token = keys.issue(7, TokenType::Access).unwrap();
        let claims = keys.verify(&token, TokenType::Access).unwrap();
        assert_eq!(claims.user_id, 7);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let keys = keys();
        let refresh = keys.issue(7, TokenType::Refresh).unwrap();
        assert!(keys.verify(&refresh, TokenType::Refresh).is_ok());
        assert!(matches!(
            keys.verify(&refresh, TokenType::Access),
            Err(ApiError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = JwtKeys::new("test-secret", Duration::minutes(-10), Duration::hours(24));
        let token = keys.issue(1, TokenType::Access).unwrap();
        assert!(keys.verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let token = JwtKeys::new("other-secret", Duration::minutes(5), Duration::hours(1))
            .issue(1, TokenType::Access)
            .unwrap();
        assert!(keys().verify(&token, TokenType::Access).is_err());
    }
}
