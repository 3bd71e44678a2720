//! User model - tenant-scoped accounts with password or OAuth credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    TenantOwner,
    Staff,
    Client,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::TenantOwner => "tenant_owner",
            UserRole::Staff => "staff",
            UserRole::Client => "client",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(UserRole::SuperAdmin),
            "tenant_owner" => Ok(UserRole::TenantOwner),
            "staff" => Ok(UserRole::Staff),
            "client" => Ok(UserRole::Client),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

/// User state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Active,
    Disabled,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Active => "active",
            UserState::Disabled => "disabled",
        }
    }
}

/// User entity.
///
/// Either `password_hash` or the `(oauth_provider, oauth_provider_id)` pair
/// is always present; pure-OAuth accounts carry no hash until the user sets
/// an initial password.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub password_hash: Option<String>,
    pub role_code: String,
    pub user_state_code: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub oauth_provider: Option<String>,
    pub oauth_provider_id: Option<String>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub email_verified_utc: Option<DateTime<Utc>>,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Profile fields shared by the registration and provisioning paths.
#[derive(Debug, Clone)]
pub struct NewUserProfile {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

impl User {
    /// Create a new password-holding tenant owner.
    pub fn new_password_owner(
        tenant_id: Uuid,
        email: String,
        password_hash: String,
        profile: NewUserProfile,
    ) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            tenant_id: Some(tenant_id),
            email,
            password_hash: Some(password_hash),
            role_code: UserRole::TenantOwner.as_str().to_string(),
            user_state_code: UserState::Active.as_str().to_string(),
            first_name: profile.first_name,
            last_name: profile.last_name,
            phone: profile.phone,
            avatar_url: profile.avatar_url,
            oauth_provider: None,
            oauth_provider_id: None,
            failed_login_attempts: 0,
            locked_until: None,
            email_verified_utc: Some(Utc::now()),
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Create a new tenant owner backed only by a provider identity.
    pub fn new_oauth_owner(
        tenant_id: Uuid,
        email: String,
        provider: &str,
        provider_id: &str,
        profile: NewUserProfile,
    ) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            tenant_id: Some(tenant_id),
            email,
            password_hash: None,
            role_code: UserRole::TenantOwner.as_str().to_string(),
            user_state_code: UserState::Active.as_str().to_string(),
            first_name: profile.first_name,
            last_name: profile.last_name,
            phone: profile.phone,
            avatar_url: profile.avatar_url,
            oauth_provider: Some(provider.to_string()),
            oauth_provider_id: Some(provider_id.to_string()),
            failed_login_attempts: 0,
            locked_until: None,
            email_verified_utc: Some(Utc::now()),
            last_login_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Check if the user is active.
    pub fn is_active(&self) -> bool {
        self.user_state_code == UserState::Active.as_str()
    }

    /// Check if the account can authenticate with a password.
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Parsed role; unknown codes fall back to the least-privileged role.
    pub fn role(&self) -> UserRole {
        self.role_code.parse().unwrap_or(UserRole::Client)
    }
}
