use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::dtos::auth::{RegisterRequest, Session, UserProfile};
use crate::models::{NewUserProfile, Tenant, User, UserRole};
use crate::services::{
    AccessTokenClaims, AuthStore, JwtService, LockoutGuard, ServiceError, SessionStore,
    TokenBlacklist,
};
use crate::utils::password::{check_reuse, hash_password, validate_strength, verify_password};

/// Orchestrates register / login / refresh / logout / change-password over
/// the credential, lockout, token and session components.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    sessions: SessionStore,
    lockout: LockoutGuard,
    jwt: JwtService,
    blacklist: Arc<dyn TokenBlacklist>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        sessions: SessionStore,
        lockout: LockoutGuard,
        jwt: JwtService,
        blacklist: Arc<dyn TokenBlacklist>,
    ) -> Self {
        Self {
            store,
            sessions,
            lockout,
            jwt,
            blacklist,
        }
    }

    /// Register a new tenant owner: a tenant on a 14-day trial plus its
    /// owning user, created as one atomic unit.
    pub async fn register(&self, req: RegisterRequest) -> Result<Session, ServiceError> {
        validate_strength(&req.password)?;

        if self.store.find_user_by_email(&req.email).await?.is_some() {
            return Err(ServiceError::EmailTaken);
        }

        let password_hash = hash_password(&req.password)?;

        let tenant = Tenant::new_trial(req.business_name, req.email.clone(), req.phone.clone());
        let user = User::new_password_owner(
            tenant.tenant_id,
            req.email,
            password_hash,
            NewUserProfile {
                first_name: req.first_name,
                last_name: req.last_name,
                phone: req.phone,
                avatar_url: None,
            },
        );

        self.store.create_tenant_with_owner(&tenant, &user).await?;

        tracing::info!(user_id = %user.user_id, tenant_id = %tenant.tenant_id, "User registered");

        self.issue_session(&user, Some(&tenant), None).await
    }

    /// Authenticate with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        self.lockout.ensure_unlocked(&user).await?;

        if !user.is_active() {
            return Err(ServiceError::AccountDisabled);
        }

        let tenant = self.load_tenant_checked(&user).await?;

        let password_hash = match &user.password_hash {
            Some(hash) => hash,
            None => {
                let provider = user
                    .oauth_provider
                    .clone()
                    .unwrap_or_else(|| "social login".to_string());
                return Err(ServiceError::UseSocialLogin(provider));
            }
        };

        if !verify_password(password, password_hash) {
            self.lockout.record_failure(&user).await?;
            return Err(ServiceError::InvalidCredentials);
        }

        self.lockout.record_success(&user).await?;
        self.store.record_login(user.user_id).await?;

        // Client-role users carry their client record id so the caller can
        // route them without an extra lookup.
        let client_id = if user.role() == UserRole::Client {
            self.store.find_client_id_for_user(user.user_id).await?
        } else {
            None
        };

        tracing::info!(user_id = %user.user_id, "User logged in");

        self.issue_session(&user, tenant.as_ref(), client_id).await
    }

    /// Exchange a refresh token for a new pair. Single-use: the presented
    /// token's row is consumed even before the user is re-checked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, ServiceError> {
        let row = self.sessions.rotate(refresh_token).await?;

        let user = self
            .store
            .find_user_by_id(row.user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !user.is_active() {
            return Err(ServiceError::AccountDisabled);
        }

        let tenant = self.load_tenant_checked(&user).await?;

        tracing::debug!(user_id = %user.user_id, "Session refreshed");

        self.issue_session(&user, tenant.as_ref(), None).await
    }

    /// Log out one session: blacklist the presented access token for its
    /// natural lifetime and drop the refresh row.
    pub async fn logout(
        &self,
        refresh_token: &str,
        access_jti: &str,
        access_exp: i64,
    ) -> Result<(), ServiceError> {
        self.revoke_access(access_jti, access_exp).await?;
        self.sessions.revoke_one(refresh_token).await?;

        tracing::info!("User logged out");
        Ok(())
    }

    /// Log out every session the user holds.
    pub async fn logout_all(
        &self,
        user_id: Uuid,
        access_jti: &str,
        access_exp: i64,
    ) -> Result<u64, ServiceError> {
        self.revoke_access(access_jti, access_exp).await?;
        let revoked = self.sessions.revoke_all(user_id).await?;

        tracing::info!(user_id = %user_id, revoked, "User logged out everywhere");
        Ok(revoked)
    }

    /// Change (or, for pure-OAuth accounts, set) the password. On success
    /// the previous hash joins the history and every session is revoked.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        // Proof of the current password is skipped only when there is none:
        // OAuth-only accounts may set their first password.
        if let Some(current_hash) = &user.password_hash {
            if !verify_password(current_password, current_hash) {
                return Err(ServiceError::InvalidCredentials);
            }
        }

        validate_strength(new_password)?;

        let history = self.store.password_history(user_id).await?;
        let history_hashes: Vec<String> =
            history.into_iter().map(|e| e.password_hash).collect();
        check_reuse(new_password, user.password_hash.as_deref(), &history_hashes)?;

        let new_hash = hash_password(new_password)?;
        self.store.update_password_hash(user_id, &new_hash).await?;

        if let Some(old_hash) = &user.password_hash {
            self.store.append_password_history(user_id, old_hash).await?;
        }

        // Force re-authentication everywhere
        let revoked = self.sessions.revoke_all(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Password changed");

        Ok(())
    }

    /// Validate an access token: signature, expiry and revocation.
    pub async fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let claims = self.jwt.verify_access(token)?;

        let revoked = self
            .blacklist
            .is_revoked(&claims.jti)
            .await
            .map_err(ServiceError::Internal)?;
        if revoked {
            return Err(ServiceError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Full authentication for the request path: token checks plus user and
    /// tenant state.
    pub async fn authenticate(
        &self,
        token: &str,
    ) -> Result<(AccessTokenClaims, User), ServiceError> {
        let claims = self.verify_access(token).await?;

        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !user.is_active() {
            return Err(ServiceError::AccountDisabled);
        }

        self.load_tenant_checked(&user).await?;

        Ok((claims, user))
    }

    /// Current profile for an authenticated user id.
    pub async fn verify_and_get_user(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .filter(User::is_active)
            .ok_or(ServiceError::UserNotFound)?;

        let tenant = match user.tenant_id {
            Some(tenant_id) => self.store.find_tenant_by_id(tenant_id).await?,
            None => None,
        };

        Ok(UserProfile::from_parts(&user, tenant.as_ref(), None))
    }

    async fn revoke_access(&self, access_jti: &str, access_exp: i64) -> Result<(), ServiceError> {
        // A token already past its expiry needs no blacklist entry
        if access_exp > Utc::now().timestamp() {
            self.blacklist
                .revoke(access_jti, access_exp * 1000)
                .await
                .map_err(ServiceError::Internal)?;
        }
        Ok(())
    }

    /// Load the owning tenant and enforce the subscription invariant:
    /// cancelled tenants reject all non-super-admin authentication.
    async fn load_tenant_checked(&self, user: &User) -> Result<Option<Tenant>, ServiceError> {
        let tenant = match user.tenant_id {
            Some(tenant_id) => self.store.find_tenant_by_id(tenant_id).await?,
            None => None,
        };

        if user.role() != UserRole::SuperAdmin {
            if let Some(tenant) = &tenant {
                if tenant.is_cancelled() {
                    return Err(ServiceError::TenantSuspended);
                }
            }
        }

        Ok(tenant)
    }

    async fn issue_session(
        &self,
        user: &User,
        tenant: Option<&Tenant>,
        client_id: Option<Uuid>,
    ) -> Result<Session, ServiceError> {
        let pair = self
            .jwt
            .issue_pair(user.user_id, user.tenant_id, &user.role_code)?;
        self.sessions.create(user.user_id, &pair.refresh_token).await?;

        Ok(Session::new(
            UserProfile::from_parts(user, tenant, client_id),
            pair,
            self.jwt.access_token_expiry_seconds(),
        ))
    }
}
