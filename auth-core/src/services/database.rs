//! Storage access for the auth core.
//!
//! [`AuthStore`] is the seam between the components and the relational
//! store; [`Database`] is the PostgreSQL implementation using sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{OAuthState, PasswordHistoryEntry, RefreshToken, Tenant, User};
use crate::services::ServiceError;

/// Row-level operations the auth components need from the external stores.
#[async_trait]
pub trait AuthStore: Send + Sync {
    // -- users --
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn find_user_by_oauth_identity(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, ServiceError>;

    /// Create a tenant and its owning user as one atomic unit; partial
    /// creation must roll back.
    async fn create_tenant_with_owner(
        &self,
        tenant: &Tenant,
        user: &User,
    ) -> Result<(), ServiceError>;

    /// Stamp a successful login.
    async fn record_login(&self, user_id: Uuid) -> Result<(), ServiceError>;

    /// Attach a provider identity to an existing account and stamp the
    /// login. The avatar is backfilled only when previously unset.
    async fn link_oauth_identity(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_id: &str,
        avatar_url: Option<&str>,
    ) -> Result<(), ServiceError>;

    /// Stamp an OAuth login on an already-linked account.
    async fn touch_oauth_login(
        &self,
        user_id: Uuid,
        avatar_url: Option<&str>,
    ) -> Result<(), ServiceError>;

    async fn set_lockout_state(
        &self,
        user_id: Uuid,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), ServiceError>;

    async fn update_password_hash(&self, user_id: Uuid, hash: &str) -> Result<(), ServiceError>;

    // -- tenants --
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError>;

    // -- refresh tokens --
    async fn insert_refresh_token(&self, row: &RefreshToken) -> Result<(), ServiceError>;

    /// Atomically delete the row matching `token` if it has not expired and
    /// return it. Exactly one concurrent caller can win.
    async fn consume_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, ServiceError>;

    async fn delete_refresh_token(&self, token: &str) -> Result<(), ServiceError>;
    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError>;
    async fn delete_expired_refresh_tokens(&self) -> Result<u64, ServiceError>;

    // -- password history --
    /// Latest retained hashes, most recent first.
    async fn password_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasswordHistoryEntry>, ServiceError>;

    /// Append a retired hash and prune the history to its cap.
    async fn append_password_history(
        &self,
        user_id: Uuid,
        old_hash: &str,
    ) -> Result<(), ServiceError>;

    // -- OAuth states --
    async fn insert_oauth_state(&self, row: &OAuthState) -> Result<(), ServiceError>;

    /// Atomically delete the matching non-expired state row and return it.
    async fn consume_oauth_state(
        &self,
        state: &str,
        provider: &str,
    ) -> Result<Option<OAuthState>, ServiceError>;

    async fn delete_expired_oauth_states(&self) -> Result<u64, ServiceError>;

    // -- clients --
    /// Client record backing a user with the client role, if any.
    async fn find_client_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError>;
}

/// PostgreSQL store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthStore for Database {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_user_by_oauth_identity(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE oauth_provider = $1 AND oauth_provider_id = $2",
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_tenant_with_owner(
        &self,
        tenant: &Tenant,
        user: &User,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, business_name, owner_email, phone,
                subscription_plan_code, subscription_state_code, trial_ends_utc,
                max_clients, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.business_name)
        .bind(&tenant.owner_email)
        .bind(&tenant.phone)
        .bind(&tenant.subscription_plan_code)
        .bind(&tenant.subscription_state_code)
        .bind(tenant.trial_ends_utc)
        .bind(tenant.max_clients)
        .bind(tenant.created_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, tenant_id, email, password_hash, role_code,
                user_state_code, first_name, last_name, phone, avatar_url,
                oauth_provider, oauth_provider_id, failed_login_attempts,
                locked_until, email_verified_utc, last_login_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(user.user_id)
        .bind(user.tenant_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role_code)
        .bind(&user.user_state_code)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.avatar_url)
        .bind(&user.oauth_provider)
        .bind(&user.oauth_provider_id)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.email_verified_utc)
        .bind(user.last_login_utc)
        .bind(user.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET last_login_utc = now() WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn link_oauth_identity(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_id: &str,
        avatar_url: Option<&str>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE users
            SET oauth_provider = $2, oauth_provider_id = $3,
                last_login_utc = now(), avatar_url = COALESCE(avatar_url, $4)
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_id)
        .bind(avatar_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_oauth_login(
        &self,
        user_id: Uuid,
        avatar_url: Option<&str>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE users
            SET last_login_utc = now(), avatar_url = COALESCE(avatar_url, $2)
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(avatar_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_lockout_state(
        &self,
        user_id: Uuid,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = $2, locked_until = $3 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(failed_attempts)
        .bind(locked_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password_hash(&self, user_id: Uuid, hash: &str) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn insert_refresh_token(&self, row: &RefreshToken) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, token, expires_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(row.token_id)
        .bind(row.user_id)
        .bind(&row.token)
        .bind(row.expires_utc)
        .bind(row.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        // Single conditional DELETE so concurrent refresh calls with the
        // same token cannot both observe the row.
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            DELETE FROM refresh_tokens
            WHERE token = $1 AND expires_utc > now()
            RETURNING token_id, user_id, token, expires_utc, created_utc
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_refresh_tokens(&self) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_utc < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn password_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasswordHistoryEntry>, ServiceError> {
        let entries = sqlx::query_as::<_, PasswordHistoryEntry>(
            r#"
            SELECT * FROM password_history
            WHERE user_id = $1
            ORDER BY created_utc DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(crate::models::PASSWORD_HISTORY_DEPTH as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn append_password_history(
        &self,
        user_id: Uuid,
        old_hash: &str,
    ) -> Result<(), ServiceError> {
        let entry = PasswordHistoryEntry::new(user_id, old_hash.to_string());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO password_history (entry_id, user_id, password_hash, created_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.user_id)
        .bind(&entry.password_hash)
        .bind(entry.created_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM password_history
            WHERE user_id = $1
              AND entry_id NOT IN (
                SELECT entry_id FROM password_history
                WHERE user_id = $1
                ORDER BY created_utc DESC
                LIMIT $2
              )
            "#,
        )
        .bind(user_id)
        .bind(crate::models::PASSWORD_HISTORY_DEPTH as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_oauth_state(&self, row: &OAuthState) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, provider_code, expires_utc, created_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&row.state)
        .bind(&row.provider_code)
        .bind(row.expires_utc)
        .bind(row.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_oauth_state(
        &self,
        state: &str,
        provider: &str,
    ) -> Result<Option<OAuthState>, ServiceError> {
        let row = sqlx::query_as::<_, OAuthState>(
            r#"
            DELETE FROM oauth_states
            WHERE state = $1 AND provider_code = $2 AND expires_utc > now()
            RETURNING state, provider_code, expires_utc, created_utc
            "#,
        )
        .bind(state)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_expired_oauth_states(&self) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_utc < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_client_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError> {
        let client_id =
            sqlx::query_scalar::<_, Uuid>("SELECT client_id FROM clients WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(client_id)
    }
}
