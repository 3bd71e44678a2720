//! Authentication, session and federated identity core.
//!
//! The surrounding system obtains an authenticated identity
//! (user, tenant, role) through this crate and otherwise never touches its
//! internals. The HTTP routing layer lives outside; this crate contributes
//! the service facade, the OAuth broker, and the middleware / cookie
//! helpers the router mounts.

pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::services::{
    AuthService, AuthStore, IdentityBroker, JwtService, LockoutGuard, SessionStore, TokenBlacklist,
};

/// Wired-up core handed to the surrounding web layer.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub auth: AuthService,
    pub broker: Arc<IdentityBroker>,
}

impl AppState {
    /// Assemble the components over a store and a revocation registry. The
    /// registry defaults to the in-process implementation; clustered
    /// deployments pass a shared one.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AuthStore>,
        blacklist: Arc<dyn TokenBlacklist>,
    ) -> Self {
        let jwt = JwtService::new(&config.jwt);
        let sessions = SessionStore::new(store.clone(), config.jwt.refresh_token_expiry_days);
        let lockout = LockoutGuard::new(store.clone(), config.lockout);

        let auth = AuthService::new(
            store.clone(),
            sessions.clone(),
            lockout,
            jwt.clone(),
            blacklist,
        );

        let broker = Arc::new(IdentityBroker::new(
            &config.oauth,
            store,
            sessions,
            jwt,
        ));

        Self {
            config: Arc::new(config),
            auth,
            broker,
        }
    }
}
