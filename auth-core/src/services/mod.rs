//! Service layer: credential policy enforcement, token issuance and
//! revocation, session persistence, lockout, OAuth federation and the
//! facade that orchestrates them.

mod auth;
mod blacklist;
mod database;
pub mod error;
mod jwt;
mod lockout;
mod oauth;
mod sessions;

pub use auth::AuthService;
pub use blacklist::{MemoryBlacklist, RedisBlacklist, TokenBlacklist};
pub use database::{AuthStore, Database};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims, TokenPair};
pub use lockout::{evaluate as evaluate_lockout, LockoutDecision, LockoutGuard};
pub use oauth::{
    CallbackParams, DiscordEndpoints, DiscordProvider, GithubEndpoints, GithubProvider,
    GoogleEndpoints, GoogleProvider, IdentityBroker, OAuthLogin, OAuthProfile, OAuthProvider,
    ProviderAuthUrl,
};
pub use sessions::SessionStore;
