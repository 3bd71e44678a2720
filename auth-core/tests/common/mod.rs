//! Shared harness for the integration suites: an in-memory [`AuthStore`],
//! component wiring over a test configuration, and local HTTP stubs
//! standing in for provider endpoints.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use auth_core::config::{
    AuthConfig, DatabaseConfig, Environment, JwtConfig, LockoutConfig, OAuthClientConfig,
    OAuthProvidersConfig,
};
use auth_core::dtos::auth::RegisterRequest;
use auth_core::models::{
    OAuthState, PasswordHistoryEntry, RefreshToken, SubscriptionState, Tenant, User, UserState,
    PASSWORD_HISTORY_DEPTH,
};
use auth_core::services::{
    AuthService, AuthStore, JwtService, LockoutGuard, MemoryBlacklist, ServiceError, SessionStore,
};

/// In-memory store mirroring the row semantics of the PostgreSQL
/// implementation. Consume operations hold one lock for the whole
/// read-and-delete, matching the conditional-delete atomicity.
#[derive(Default)]
pub struct MemoryStore {
    pub users: Mutex<Vec<User>>,
    pub tenants: Mutex<Vec<Tenant>>,
    pub refresh_tokens: Mutex<Vec<RefreshToken>>,
    pub password_history: Mutex<Vec<PasswordHistoryEntry>>,
    pub oauth_states: Mutex<Vec<OAuthState>>,
    pub clients: Mutex<HashMap<Uuid, Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- test helpers --

    pub fn user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    pub fn insert_user(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.lock().unwrap().push(tenant);
    }

    pub fn set_user_state(&self, email: &str, state: UserState) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.email == email) {
            user.user_state_code = state.as_str().to_string();
        }
    }

    pub fn set_lockout(&self, email: &str, attempts: i32, locked_until: Option<DateTime<Utc>>) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.email == email) {
            user.failed_login_attempts = attempts;
            user.locked_until = locked_until;
        }
    }

    pub fn set_subscription_state(&self, tenant_id: Uuid, state: SubscriptionState) {
        let mut tenants = self.tenants.lock().unwrap();
        if let Some(tenant) = tenants.iter_mut().find(|t| t.tenant_id == tenant_id) {
            tenant.subscription_state_code = state.as_str().to_string();
        }
    }

    pub fn expire_refresh_token(&self, token: &str) {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        if let Some(row) = tokens.iter_mut().find(|t| t.token == token) {
            row.expires_utc = Utc::now() - Duration::seconds(1);
        }
    }

    pub fn expire_oauth_state(&self, state: &str) {
        let mut states = self.oauth_states.lock().unwrap();
        if let Some(row) = states.iter_mut().find(|s| s.state == state) {
            row.expires_utc = Utc::now() - Duration::seconds(1);
        }
    }

    pub fn refresh_token_count(&self, user_id: Uuid) -> usize {
        self.refresh_tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .count()
    }

    pub fn history_hashes(&self, user_id: Uuid) -> Vec<String> {
        self.password_history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.password_hash.clone())
            .collect()
    }

    pub fn seed_history_entry(&self, user_id: Uuid, hash: String) {
        self.password_history
            .lock()
            .unwrap()
            .push(PasswordHistoryEntry::new(user_id, hash));
    }

    pub fn add_client_record(&self, user_id: Uuid) -> Uuid {
        let client_id = Uuid::new_v4();
        self.clients.lock().unwrap().insert(user_id, client_id);
        client_id
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.user_id == user_id)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.user_by_email(email))
    }

    async fn find_user_by_oauth_identity(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, ServiceError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| {
                u.oauth_provider.as_deref() == Some(provider)
                    && u.oauth_provider_id.as_deref() == Some(provider_id)
            })
            .cloned())
    }

    async fn create_tenant_with_owner(
        &self,
        tenant: &Tenant,
        user: &User,
    ) -> Result<(), ServiceError> {
        self.tenants.lock().unwrap().push(tenant.clone());
        self.users.lock().unwrap().push(user.clone());
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
            user.last_login_utc = Some(Utc::now());
        }
        Ok(())
    }

    async fn link_oauth_identity(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_id: &str,
        avatar_url: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
            user.oauth_provider = Some(provider.to_string());
            user.oauth_provider_id = Some(provider_id.to_string());
            user.last_login_utc = Some(Utc::now());
            if user.avatar_url.is_none() {
                user.avatar_url = avatar_url.map(|s| s.to_string());
            }
        }
        Ok(())
    }

    async fn touch_oauth_login(
        &self,
        user_id: Uuid,
        avatar_url: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
            user.last_login_utc = Some(Utc::now());
            if user.avatar_url.is_none() {
                user.avatar_url = avatar_url.map(|s| s.to_string());
            }
        }
        Ok(())
    }

    async fn set_lockout_state(
        &self,
        user_id: Uuid,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), ServiceError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
            user.failed_login_attempts = failed_attempts;
            user.locked_until = locked_until;
        }
        Ok(())
    }

    async fn update_password_hash(&self, user_id: Uuid, hash: &str) -> Result<(), ServiceError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
            user.password_hash = Some(hash.to_string());
        }
        Ok(())
    }

    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn insert_refresh_token(&self, row: &RefreshToken) -> Result<(), ServiceError> {
        self.refresh_tokens.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        let now = Utc::now();
        let position = tokens
            .iter()
            .position(|t| t.token == token && t.expires_utc > now);
        Ok(position.map(|i| tokens.remove(i)))
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), ServiceError> {
        self.refresh_tokens
            .lock()
            .unwrap()
            .retain(|t| t.token != token);
        Ok(())
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|t| t.user_id != user_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_expired_refresh_tokens(&self) -> Result<u64, ServiceError> {
        let mut tokens = self.refresh_tokens.lock().unwrap();
        let now = Utc::now();
        let before = tokens.len();
        tokens.retain(|t| t.expires_utc >= now);
        Ok((before - tokens.len()) as u64)
    }

    async fn password_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasswordHistoryEntry>, ServiceError> {
        // Most recent first, capped like the SQL query
        Ok(self
            .password_history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id)
            .rev()
            .take(PASSWORD_HISTORY_DEPTH)
            .cloned()
            .collect())
    }

    async fn append_password_history(
        &self,
        user_id: Uuid,
        old_hash: &str,
    ) -> Result<(), ServiceError> {
        let mut history = self.password_history.lock().unwrap();
        history.push(PasswordHistoryEntry::new(user_id, old_hash.to_string()));

        let excess = history
            .iter()
            .filter(|e| e.user_id == user_id)
            .count()
            .saturating_sub(PASSWORD_HISTORY_DEPTH);
        for _ in 0..excess {
            if let Some(oldest) = history.iter().position(|e| e.user_id == user_id) {
                history.remove(oldest);
            }
        }
        Ok(())
    }

    async fn insert_oauth_state(&self, row: &OAuthState) -> Result<(), ServiceError> {
        self.oauth_states.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn consume_oauth_state(
        &self,
        state: &str,
        provider: &str,
    ) -> Result<Option<OAuthState>, ServiceError> {
        let mut states = self.oauth_states.lock().unwrap();
        let now = Utc::now();
        let position = states
            .iter()
            .position(|s| s.state == state && s.provider_code == provider && s.expires_utc > now);
        Ok(position.map(|i| states.remove(i)))
    }

    async fn delete_expired_oauth_states(&self) -> Result<u64, ServiceError> {
        let mut states = self.oauth_states.lock().unwrap();
        let now = Utc::now();
        let before = states.len();
        states.retain(|s| s.expires_utc >= now);
        Ok((before - states.len()) as u64)
    }

    async fn find_client_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError> {
        Ok(self.clients.lock().unwrap().get(&user_id).copied())
    }
}

/// Fully wired core over the in-memory store.
pub struct TestHarness {
    pub config: AuthConfig,
    pub store: Arc<MemoryStore>,
    pub blacklist: Arc<MemoryBlacklist>,
    pub jwt: JwtService,
    pub sessions: SessionStore,
    pub auth: AuthService,
}

pub fn test_config() -> AuthConfig {
    let unconfigured = OAuthClientConfig {
        client_id: String::new(),
        client_secret: String::new(),
        redirect_uri: String::new(),
    };

    AuthConfig {
        environment: Environment::Dev,
        service_name: "auth-core-test".to_string(),
        log_level: "error".to_string(),
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        lockout: LockoutConfig {
            max_failed_attempts: 5,
            lockout_minutes: 15,
        },
        oauth: OAuthProvidersConfig {
            google: unconfigured.clone(),
            github: unconfigured.clone(),
            discord: unconfigured,
        },
    }
}

pub fn harness() -> TestHarness {
    harness_with_config(test_config())
}

pub fn harness_with_config(config: AuthConfig) -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let blacklist = Arc::new(MemoryBlacklist::new());
    let jwt = JwtService::new(&config.jwt);
    let sessions = SessionStore::new(store.clone(), config.jwt.refresh_token_expiry_days);
    let lockout = LockoutGuard::new(store.clone(), config.lockout);

    let auth = AuthService::new(
        store.clone(),
        sessions.clone(),
        lockout,
        jwt.clone(),
        blacklist.clone(),
    );

    TestHarness {
        config,
        store,
        blacklist,
        jwt,
        sessions,
        auth,
    }
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: "Str0ng!Pw".to_string(),
        first_name: "Mario".to_string(),
        last_name: "Rossi".to_string(),
        phone: Some("+39 333 1234567".to_string()),
        business_name: "Palestra Fit".to_string(),
    }
}

/// Spawn a local HTTP server for provider endpoint stubs; returns its base
/// URL.
pub async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve stub");
    });

    format!("http://{}", addr)
}
