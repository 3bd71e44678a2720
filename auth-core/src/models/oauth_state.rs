//! OAuth CSRF state - single-use token binding an authorization request to
//! its callback.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifetime of an issued state value.
pub const STATE_TTL_MINUTES: i64 = 5;

/// OAuth state entity. Consumed (deleted) exactly once on callback.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthState {
    pub state: String,
    pub provider_code: String,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl OAuthState {
    /// Issue a fresh random state for `provider`.
    pub fn issue(provider: &str) -> Self {
        let now = Utc::now();
        Self {
            state: Uuid::new_v4().to_string(),
            provider_code: provider.to_string(),
            expires_utc: now + Duration::minutes(STATE_TTL_MINUTES),
            created_utc: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_utc <= Utc::now()
    }
}
