//! Refresh token model - one row per active session.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh token entity. Single-use: rotation deletes the row before a
/// replacement pair is issued.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl RefreshToken {
    /// Create a new refresh token row expiring `expiry_days` from now.
    pub fn new(user_id: Uuid, token: String, expiry_days: i64) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token,
            expires_utc: now + Duration::days(expiry_days),
            created_utc: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_utc <= Utc::now()
    }
}
