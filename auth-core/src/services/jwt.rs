use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::services::ServiceError;

/// JWT service for token generation and validation. Access and refresh
/// tokens are signed with distinct secrets so possession of one class
/// cannot forge the other.
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Claims for access tokens (short-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Owning tenant (absent for super admins)
    pub tenant_id: Option<Uuid>,
    /// Role code
    pub role: String,
    /// JWT ID - the revocation handle
    pub jti: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Claims for refresh tokens (long-lived, single-use via the session store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Token class marker, always "refresh"
    #[serde(rename = "type")]
    pub token_type: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        }
    }

    /// Generate an access/refresh pair for a user.
    pub fn issue_pair(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        role: &str,
    ) -> Result<TokenPair, ServiceError> {
        let now = Utc::now();

        let access_claims = AccessTokenClaims {
            sub: user_id,
            tenant_id,
            role: role.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
        };

        let refresh_claims = RefreshTokenClaims {
            sub: user_id,
            token_type: "refresh".to_string(),
            exp: (now + Duration::days(self.refresh_token_expiry_days)).timestamp(),
            iat: now.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access_claims, &self.access_encoding)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode access token: {}", e)))?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh_encoding)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode refresh token: {}", e)))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let validation = Validation::new(Algorithm::HS256);

        let token_data = decode::<AccessTokenClaims>(token, &self.access_decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                _ => ServiceError::TokenInvalid,
            })?;

        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshTokenClaims, ServiceError> {
        let validation = Validation::new(Algorithm::HS256);

        let token_data = decode::<RefreshTokenClaims>(token, &self.refresh_decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                _ => ServiceError::TokenInvalid,
            })?;

        if token_data.claims.token_type != "refresh" {
            return Err(ServiceError::TokenInvalid);
        }

        Ok(token_data.claims)
    }

    /// Access token expiry in seconds (reported to clients).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    /// Refresh token expiry in days (drives the session-store row TTL).
    pub fn refresh_token_expiry_days(&self) -> i64 {
        self.refresh_token_expiry_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-test-secret".to_string(),
            refresh_secret: "refresh-test-secret".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        }
    }

    #[test]
    fn access_token_round_trip() {
        let service = JwtService::new(&test_config());
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();

        let pair = service
            .issue_pair(user_id, Some(tenant_id), "tenant_owner")
            .expect("issue");

        let claims = service.verify_access(&pair.access_token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.tenant_id, Some(tenant_id));
        assert_eq!(claims.role, "tenant_owner");
        assert!(!claims.jti.is_empty());
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn refresh_token_round_trip() {
        let service = JwtService::new(&test_config());
        let user_id = Uuid::new_v4();

        let pair = service.issue_pair(user_id, None, "super_admin").expect("issue");

        let claims = service.verify_refresh(&pair.refresh_token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.token_type, "refresh");
    }

    #[test]
    fn each_access_token_gets_a_unique_jti() {
        let service = JwtService::new(&test_config());
        let user_id = Uuid::new_v4();

        let a = service.issue_pair(user_id, None, "staff").expect("issue");
        let b = service.issue_pair(user_id, None, "staff").expect("issue");

        let jti_a = service.verify_access(&a.access_token).expect("verify").jti;
        let jti_b = service.verify_access(&b.access_token).expect("verify").jti;
        assert_ne!(jti_a, jti_b);
    }

    #[test]
    fn token_classes_are_not_interchangeable() {
        let service = JwtService::new(&test_config());
        let pair = service
            .issue_pair(Uuid::new_v4(), None, "client")
            .expect("issue");

        // A refresh token cannot pass access verification and vice versa
        assert!(matches!(
            service.verify_access(&pair.refresh_token),
            Err(ServiceError::TokenInvalid)
        ));
        assert!(matches!(
            service.verify_refresh(&pair.access_token),
            Err(ServiceError::TokenInvalid)
        ));
    }

    #[test]
    fn expired_access_token_is_reported_as_expired() {
        let config = JwtConfig {
            access_token_expiry_minutes: -2,
            ..test_config()
        };
        let service = JwtService::new(&config);
        let pair = service
            .issue_pair(Uuid::new_v4(), None, "client")
            .expect("issue");

        assert!(matches!(
            service.verify_access(&pair.access_token),
            Err(ServiceError::TokenExpired)
        ));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let service = JwtService::new(&test_config());
        let pair = service
            .issue_pair(Uuid::new_v4(), None, "client")
            .expect("issue");

        let mut tampered = pair.access_token.clone();
        tampered.pop();
        assert!(matches!(
            service.verify_access(&tampered),
            Err(ServiceError::TokenInvalid)
        ));

        assert!(matches!(
            service.verify_access("not.a.token"),
            Err(ServiceError::TokenInvalid)
        ));
    }
}
