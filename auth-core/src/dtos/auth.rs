use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Tenant, User};
use crate::services::TokenPair;

/// Registration of a new tenant owner.
///
/// The derives give the outer layer its request validation; the core still
/// re-checks password strength itself.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub business_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    /// Ignored for accounts that have no password yet (pure-OAuth users
    /// setting their first one).
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Sanitized user payload returned with every session.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub avatar_url: Option<String>,
    pub business_name: Option<String>,
    pub subscription_plan: Option<String>,
    pub subscription_status: Option<String>,
    /// Client record backing this user, resolved on password login for
    /// client-role accounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
}

impl UserProfile {
    pub fn from_parts(user: &User, tenant: Option<&Tenant>, client_id: Option<Uuid>) -> Self {
        Self {
            user_id: user.user_id,
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role_code.clone(),
            avatar_url: user.avatar_url.clone(),
            business_name: tenant.map(|t| t.business_name.clone()),
            subscription_plan: tenant.map(|t| t.subscription_plan_code.clone()),
            subscription_status: tenant.map(|t| t.subscription_state_code.clone()),
            client_id,
        }
    }
}

/// An authenticated session: profile plus a fresh token pair.
#[derive(Debug, Serialize)]
pub struct Session {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl Session {
    pub fn new(user: UserProfile, pair: TokenPair, expires_in: i64) -> Self {
        Self {
            user,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_validation() {
        let valid = RegisterRequest {
            email: "mario@studio.test".to_string(),
            password: "Str0ng!Pw".to_string(),
            first_name: "Mario".to_string(),
            last_name: "Rossi".to_string(),
            phone: None,
            business_name: "Palestra Fit".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            ..valid
        };
        assert!(bad_email.validate().is_err());
    }
}
