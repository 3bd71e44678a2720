//! Password history - prior hashes kept for reuse checks.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// How many prior hashes are retained per user.
pub const PASSWORD_HISTORY_DEPTH: usize = 5;

/// One retired password hash.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordHistoryEntry {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub password_hash: String,
    pub created_utc: DateTime<Utc>,
}

impl PasswordHistoryEntry {
    pub fn new(user_id: Uuid, password_hash: String) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id,
            password_hash,
            created_utc: Utc::now(),
        }
    }
}
