//! Multi-provider OAuth federation.
//!
//! Each provider is a capability object: it knows its endpoints, scopes,
//! token-exchange request shape and profile normalization. The broker owns
//! the CSRF state lifecycle and the account resolution rules; it never
//! branches on provider names itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::config::{OAuthClientConfig, OAuthProvidersConfig};
use crate::dtos::auth::{Session, UserProfile};
use crate::models::{NewUserProfile, OAuthState, Tenant, User, UserRole};
use crate::services::{AuthStore, JwtService, ServiceError, SessionStore};

/// Timeout for every outbound provider call. A timed-out exchange or
/// profile fetch fails the whole flow; the user restarts it.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Sent with GitHub API calls, which reject requests without a user agent.
const API_USER_AGENT: &str = "coach-platform";

/// Normalized identity returned by every provider.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
}

/// Capability record for one identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Registry key, e.g. "google".
    fn name(&self) -> &'static str;

    /// Human-readable name used in error messages.
    fn display_name(&self) -> &'static str;

    /// A provider without a client id cannot start a flow.
    fn is_configured(&self) -> bool;

    /// Fully-qualified authorization URL with `state` embedded.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a provider access token.
    async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
    ) -> Result<String, ServiceError>;

    /// Fetch and normalize the user profile.
    async fn fetch_profile(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<OAuthProfile, ServiceError>;
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    grant_type: &'static str,
}

impl<'a> ExchangeRequest<'a> {
    fn new(client: &'a OAuthClientConfig, code: &'a str) -> Self {
        Self {
            client_id: &client.client_id,
            client_secret: &client.client_secret,
            code,
            redirect_uri: &client.redirect_uri,
            grant_type: "authorization_code",
        }
    }
}

#[derive(Deserialize)]
struct ExchangeReply {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ExchangeReply {
    /// Surface the provider's own error description when the exchange is
    /// rejected (expired code, bad redirect URI, ...).
    fn into_token(self, display_name: &str) -> Result<String, ServiceError> {
        if let Some(error) = self.error {
            return Err(ServiceError::TokenExchange(format!(
                "{}: {}",
                display_name,
                self.error_description.unwrap_or(error)
            )));
        }
        self.access_token.ok_or_else(|| {
            ServiceError::TokenExchange(format!("{}: no access token in response", display_name))
        })
    }
}

fn encode_query(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// First/last split with provider-specific fallbacks, mirroring what the
/// providers themselves display for accounts without real names.
fn split_display_name(full: Option<&str>, fallback_last: &str) -> (String, String) {
    let full = full.unwrap_or("").trim();
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or("User").to_string();
    let rest: Vec<&str> = parts.collect();
    let last = if rest.is_empty() {
        fallback_last.to_string()
    } else {
        rest.join(" ")
    };
    (first, last)
}

// ---------------------------------------------------------------------------
// Google
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            profile_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
        }
    }
}

pub struct GoogleProvider {
    client: OAuthClientConfig,
    endpoints: GoogleEndpoints,
}

impl GoogleProvider {
    pub fn new(client: OAuthClientConfig) -> Self {
        Self::with_endpoints(client, GoogleEndpoints::default())
    }

    pub fn with_endpoints(client: OAuthClientConfig, endpoints: GoogleEndpoints) -> Self {
        Self { client, endpoints }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

fn normalize_google(info: GoogleUserInfo) -> Result<OAuthProfile, ServiceError> {
    let email = info
        .email
        .filter(|e| !e.is_empty())
        .ok_or(ServiceError::EmailUnavailable("Google"))?;

    let (split_first, split_last) = split_display_name(info.name.as_deref(), "Google");
    Ok(OAuthProfile {
        provider_id: info.id,
        email,
        first_name: info.given_name.filter(|s| !s.is_empty()).unwrap_or(split_first),
        last_name: info.family_name.filter(|s| !s.is_empty()).unwrap_or(split_last),
        avatar_url: info.picture,
    })
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn display_name(&self) -> &'static str {
        "Google"
    }

    fn is_configured(&self) -> bool {
        !self.client.client_id.is_empty()
    }

    fn authorization_url(&self, state: &str) -> String {
        let query = encode_query(&[
            ("client_id", &self.client.client_id),
            ("redirect_uri", &self.client.redirect_uri),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "select_account"),
        ]);
        format!("{}?{}", self.endpoints.auth_url, query)
    }

    async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
    ) -> Result<String, ServiceError> {
        let reply: ExchangeReply = http
            .post(&self.endpoints.token_url)
            .json(&ExchangeRequest::new(&self.client, code))
            .send()
            .await?
            .json()
            .await?;
        reply.into_token(self.display_name())
    }

    async fn fetch_profile(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<OAuthProfile, ServiceError> {
        let info: GoogleUserInfo = http
            .get(&self.endpoints.profile_url)
            .bearer_auth(access_token)
            .send()
            .await?
            .json()
            .await?;
        normalize_google(info)
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GithubEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
    /// Secondary lookup: the profile omits the email when it is private.
    pub emails_url: String,
}

impl Default for GithubEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            profile_url: "https://api.github.com/user".to_string(),
            emails_url: "https://api.github.com/user/emails".to_string(),
        }
    }
}

pub struct GithubProvider {
    client: OAuthClientConfig,
    endpoints: GithubEndpoints,
}

impl GithubProvider {
    pub fn new(client: OAuthClientConfig) -> Self {
        Self::with_endpoints(client, GithubEndpoints::default())
    }

    pub fn with_endpoints(client: OAuthClientConfig, endpoints: GithubEndpoints) -> Self {
        Self { client, endpoints }
    }
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: Option<String>,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

fn normalize_github(user: GithubUser, email: String) -> OAuthProfile {
    let display = user.name.as_deref().or(user.login.as_deref());
    let (first_name, last_name) = split_display_name(display, "GitHub");
    OAuthProfile {
        provider_id: user.id.to_string(),
        email,
        first_name,
        last_name,
        avatar_url: user.avatar_url,
    }
}

fn pick_github_email(emails: Vec<GithubEmail>) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.first())
        .map(|e| e.email.clone())
}

#[async_trait]
impl OAuthProvider for GithubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn display_name(&self) -> &'static str {
        "GitHub"
    }

    fn is_configured(&self) -> bool {
        !self.client.client_id.is_empty()
    }

    fn authorization_url(&self, state: &str) -> String {
        let query = encode_query(&[
            ("client_id", &self.client.client_id),
            ("redirect_uri", &self.client.redirect_uri),
            ("response_type", "code"),
            ("scope", "user:email read:user"),
            ("state", state),
        ]);
        format!("{}?{}", self.endpoints.auth_url, query)
    }

    async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
    ) -> Result<String, ServiceError> {
        let reply: ExchangeReply = http
            .post(&self.endpoints.token_url)
            .header(header::ACCEPT, "application/json")
            .json(&ExchangeRequest::new(&self.client, code))
            .send()
            .await?
            .json()
            .await?;
        reply.into_token(self.display_name())
    }

    async fn fetch_profile(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<OAuthProfile, ServiceError> {
        let user: GithubUser = http
            .get(&self.endpoints.profile_url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, API_USER_AGENT)
            .send()
            .await?
            .json()
            .await?;

        let email = match user.email.clone().filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                let emails: Vec<GithubEmail> = http
                    .get(&self.endpoints.emails_url)
                    .bearer_auth(access_token)
                    .header(header::ACCEPT, "application/vnd.github+json")
                    .header(header::USER_AGENT, API_USER_AGENT)
                    .send()
                    .await?
                    .json()
                    .await?;
                pick_github_email(emails).ok_or(ServiceError::EmailUnavailable("GitHub"))?
            }
        };

        Ok(normalize_github(user, email))
    }
}

// ---------------------------------------------------------------------------
// Discord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiscordEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub cdn_base: String,
}

impl Default for DiscordEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://discord.com/api/oauth2/authorize".to_string(),
            token_url: "https://discord.com/api/oauth2/token".to_string(),
            profile_url: "https://discord.com/api/users/@me".to_string(),
            cdn_base: "https://cdn.discordapp.com".to_string(),
        }
    }
}

pub struct DiscordProvider {
    client: OAuthClientConfig,
    endpoints: DiscordEndpoints,
}

impl DiscordProvider {
    pub fn new(client: OAuthClientConfig) -> Self {
        Self::with_endpoints(client, DiscordEndpoints::default())
    }

    pub fn with_endpoints(client: OAuthClientConfig, endpoints: DiscordEndpoints) -> Self {
        Self { client, endpoints }
    }
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: Option<String>,
    global_name: Option<String>,
    email: Option<String>,
    avatar: Option<String>,
}

fn normalize_discord(user: DiscordUser, cdn_base: &str) -> Result<OAuthProfile, ServiceError> {
    let email = user
        .email
        .filter(|e| !e.is_empty())
        .ok_or(ServiceError::EmailUnavailable("Discord"))?;

    let display = user.global_name.as_deref().or(user.username.as_deref());
    let (first_name, last_name) = split_display_name(display, "Discord");

    let avatar_url = user.avatar.map(|hash| {
        format!("{}/avatars/{}/{}.png?size=256", cdn_base, user.id, hash)
    });

    Ok(OAuthProfile {
        provider_id: user.id,
        email,
        first_name,
        last_name,
        avatar_url,
    })
}

#[async_trait]
impl OAuthProvider for DiscordProvider {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn display_name(&self) -> &'static str {
        "Discord"
    }

    fn is_configured(&self) -> bool {
        !self.client.client_id.is_empty()
    }

    fn authorization_url(&self, state: &str) -> String {
        let query = encode_query(&[
            ("client_id", &self.client.client_id),
            ("redirect_uri", &self.client.redirect_uri),
            ("response_type", "code"),
            ("scope", "identify email"),
            ("state", state),
            ("prompt", "consent"),
        ]);
        format!("{}?{}", self.endpoints.auth_url, query)
    }

    async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
    ) -> Result<String, ServiceError> {
        // Discord only accepts form-encoded token requests
        let reply: ExchangeReply = http
            .post(&self.endpoints.token_url)
            .form(&ExchangeRequest::new(&self.client, code))
            .send()
            .await?
            .json()
            .await?;
        reply.into_token(self.display_name())
    }

    async fn fetch_profile(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<OAuthProfile, ServiceError> {
        let user: DiscordUser = http
            .get(&self.endpoints.profile_url)
            .bearer_auth(access_token)
            .send()
            .await?
            .json()
            .await?;
        normalize_discord(user, &self.endpoints.cdn_base)
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// Authorization redirect handed to the browser.
#[derive(Debug, Clone)]
pub struct ProviderAuthUrl {
    pub provider: &'static str,
    pub url: String,
    pub state: String,
}

/// Query parameters a provider sends to the callback endpoint. Providers
/// redirect back with either `code`+`state` or `error`+`error_description`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn success(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }
}

/// Result of a completed callback.
#[derive(Debug)]
pub struct OAuthLogin {
    pub session: Session,
    pub is_new_user: bool,
}

/// Brokered OAuth login across the registered providers.
pub struct IdentityBroker {
    providers: Vec<Arc<dyn OAuthProvider>>,
    store: Arc<dyn AuthStore>,
    sessions: SessionStore,
    jwt: JwtService,
    http: reqwest::Client,
}

impl IdentityBroker {
    pub fn new(
        config: &OAuthProvidersConfig,
        store: Arc<dyn AuthStore>,
        sessions: SessionStore,
        jwt: JwtService,
    ) -> Self {
        let providers: Vec<Arc<dyn OAuthProvider>> = vec![
            Arc::new(GoogleProvider::new(config.google.clone())),
            Arc::new(GithubProvider::new(config.github.clone())),
            Arc::new(DiscordProvider::new(config.discord.clone())),
        ];
        Self::with_providers(providers, store, sessions, jwt)
    }

    /// Build a broker over an explicit provider set. Used by tests to point
    /// providers at local endpoints.
    pub fn with_providers(
        providers: Vec<Arc<dyn OAuthProvider>>,
        store: Arc<dyn AuthStore>,
        sessions: SessionStore,
        jwt: JwtService,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            providers,
            store,
            sessions,
            jwt,
            http,
        }
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn OAuthProvider>, ServiceError> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ServiceError::ProviderUnsupported(name.to_string()))
    }

    /// Start an authorization attempt: issue a CSRF state, persist it and
    /// build the provider redirect URL.
    pub async fn auth_url(&self, provider_name: &str) -> Result<ProviderAuthUrl, ServiceError> {
        let provider = self.provider(provider_name)?;
        if !provider.is_configured() {
            return Err(ServiceError::ProviderNotConfigured(provider.display_name()));
        }

        let state_row = OAuthState::issue(provider.name());
        self.store.insert_oauth_state(&state_row).await?;

        if let Err(err) = self.store.delete_expired_oauth_states().await {
            tracing::warn!(error = %err, "Failed to sweep expired OAuth states");
        }

        Ok(ProviderAuthUrl {
            provider: provider.name(),
            url: provider.authorization_url(&state_row.state),
            state: state_row.state,
        })
    }

    /// Complete a callback: consume the CSRF state, exchange the code,
    /// resolve the account and issue a session.
    pub async fn handle_callback(
        &self,
        provider_name: &str,
        params: CallbackParams,
    ) -> Result<OAuthLogin, ServiceError> {
        let provider = self.provider(provider_name)?;

        // The provider reports failure instead of sending a code, e.g. the
        // user denied consent. Branch before touching the state row.
        if let Some(error) = params.error {
            if error == "access_denied" {
                return Err(ServiceError::ConsentDenied);
            }
            return Err(ServiceError::TokenExchange(format!(
                "{}: {}",
                provider.display_name(),
                params.error_description.unwrap_or(error)
            )));
        }

        let (code, state) = match (params.code, params.state) {
            (Some(code), Some(state)) => (code, state),
            _ => return Err(ServiceError::MalformedCallback),
        };

        self.store
            .consume_oauth_state(&state, provider.name())
            .await?
            .ok_or(ServiceError::InvalidOAuthState)?;

        let provider_token = provider.exchange_code(&self.http, &code).await?;
        let profile = provider.fetch_profile(&self.http, &provider_token).await?;

        let (user, is_new_user) = self.resolve_user(provider.name(), &profile).await?;

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

        let pair = self
            .jwt
            .issue_pair(user.user_id, user.tenant_id, &user.role_code)?;
        self.sessions.create(user.user_id, &pair.refresh_token).await?;

        tracing::info!(
            user_id = %user.user_id,
            provider = provider.name(),
            is_new_user,
            "OAuth login completed"
        );

        let session = Session::new(
            UserProfile::from_parts(&user, tenant.as_ref(), None),
            pair,
            self.jwt.access_token_expiry_seconds(),
        );

        Ok(OAuthLogin {
            session,
            is_new_user,
        })
    }

    /// Account resolution precedence: provider identity, then email link,
    /// then provisioning a fresh trial tenant.
    async fn resolve_user(
        &self,
        provider: &str,
        profile: &OAuthProfile,
    ) -> Result<(User, bool), ServiceError> {
        if let Some(mut user) = self
            .store
            .find_user_by_oauth_identity(provider, &profile.provider_id)
            .await?
        {
            if !user.is_active() {
                return Err(ServiceError::AccountDisabled);
            }
            self.store
                .touch_oauth_login(user.user_id, profile.avatar_url.as_deref())
                .await?;
            if user.avatar_url.is_none() {
                user.avatar_url = profile.avatar_url.clone();
            }
            user.last_login_utc = Some(Utc::now());
            return Ok((user, false));
        }

        // Matching email merges a pre-existing password account into OAuth
        // login. Deliberate and not configurable.
        if let Some(mut user) = self.store.find_user_by_email(&profile.email).await? {
            if !user.is_active() {
                return Err(ServiceError::AccountDisabled);
            }
            self.store
                .link_oauth_identity(
                    user.user_id,
                    provider,
                    &profile.provider_id,
                    profile.avatar_url.as_deref(),
                )
                .await?;
            tracing::info!(user_id = %user.user_id, provider, "Linked provider identity to existing account");
            user.oauth_provider = Some(provider.to_string());
            user.oauth_provider_id = Some(profile.provider_id.clone());
            if user.avatar_url.is_none() {
                user.avatar_url = profile.avatar_url.clone();
            }
            user.last_login_utc = Some(Utc::now());
            return Ok((user, false));
        }

        let tenant = Tenant::new_trial(
            format!("{}'s Studio", profile.first_name),
            profile.email.clone(),
            None,
        );
        let user = User::new_oauth_owner(
            tenant.tenant_id,
            profile.email.clone(),
            provider,
            &profile.provider_id,
            NewUserProfile {
                first_name: profile.first_name.clone(),
                last_name: profile.last_name.clone(),
                phone: None,
                avatar_url: profile.avatar_url.clone(),
            },
        );
        self.store.create_tenant_with_owner(&tenant, &user).await?;

        tracing::info!(user_id = %user.user_id, provider, "Provisioned new tenant from OAuth sign-up");
        Ok((user, true))
    }
}
