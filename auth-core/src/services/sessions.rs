use std::sync::Arc;

use uuid::Uuid;

use crate::models::RefreshToken;
use crate::services::{AuthStore, ServiceError};

/// Persistence of refresh tokens: create, single-use rotation, revocation.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn AuthStore>,
    refresh_token_expiry_days: i64,
}

impl SessionStore {
    pub fn new(store: Arc<dyn AuthStore>, refresh_token_expiry_days: i64) -> Self {
        Self {
            store,
            refresh_token_expiry_days,
        }
    }

    /// Persist a freshly issued refresh token. Globally expired rows are
    /// garbage-collected on the same write; a GC failure never fails the
    /// login that triggered it.
    pub async fn create(&self, user_id: Uuid, token: &str) -> Result<(), ServiceError> {
        let row = RefreshToken::new(user_id, token.to_string(), self.refresh_token_expiry_days);
        self.store.insert_refresh_token(&row).await?;

        if let Err(err) = self.store.delete_expired_refresh_tokens().await {
            tracing::warn!(error = %err, "Failed to sweep expired refresh tokens");
        }

        Ok(())
    }

    /// Consume a refresh token. The row is deleted in the same conditional
    /// statement that matches it, so a replayed token loses the race and
    /// fails here.
    pub async fn rotate(&self, token: &str) -> Result<RefreshToken, ServiceError> {
        self.store
            .consume_refresh_token(token)
            .await?
            .ok_or(ServiceError::InvalidRefreshToken)
    }

    /// Delete one session by token value. Deleting an unknown value is not
    /// an error; logout is idempotent.
    pub async fn revoke_one(&self, token: &str) -> Result<(), ServiceError> {
        self.store.delete_refresh_token(token).await
    }

    /// Delete every session the user holds; returns how many were dropped.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        self.store.delete_refresh_tokens_for_user(user_id).await
    }
}
