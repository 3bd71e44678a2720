use serde::Deserialize;
use std::env;

use crate::error::AppError;

/// Top-level configuration for the auth core. Constructed once at startup
/// and handed to component constructors; nothing below this module reads
/// process environment directly.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub lockout: LockoutConfig,
    pub oauth: OAuthProvidersConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Signing secrets and lifetimes for the two token classes. The secrets are
/// distinct so possession of one class cannot forge the other.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

/// Brute-force defense constants. Fixed configuration, not tunable per
/// tenant.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LockoutConfig {
    pub max_failed_attempts: i32,
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProvidersConfig {
    pub google: OAuthClientConfig,
    pub github: OAuthClientConfig,
    pub discord: OAuthClientConfig,
}

/// Credentials for one provider. An empty client id means the provider is
/// not configured; requesting its authorization URL fails accordingly.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("auth-core"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            jwt: JwtConfig {
                access_secret: get_env(
                    "JWT_ACCESS_SECRET",
                    Some("dev-access-secret-change-me"),
                    is_prod,
                )?,
                refresh_secret: get_env(
                    "JWT_REFRESH_SECRET",
                    Some("dev-refresh-secret-change-me"),
                    is_prod,
                )?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?,
            },
            lockout: LockoutConfig {
                max_failed_attempts: parse_env("LOCKOUT_MAX_FAILED_ATTEMPTS", Some("5"), is_prod)?,
                lockout_minutes: parse_env("LOCKOUT_MINUTES", Some("15"), is_prod)?,
            },
            oauth: OAuthProvidersConfig {
                google: oauth_client_from_env("GOOGLE", "google")?,
                github: oauth_client_from_env("GITHUB", "github")?,
                discord: oauth_client_from_env("DISCORD", "discord")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.lockout.max_failed_attempts <= 0 || self.lockout.lockout_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Lockout threshold and duration must be positive"
            )));
        }

        // Access and refresh tokens must not be forgeable from each other
        if self.jwt.access_secret == self.jwt.refresh_secret {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ"
            )));
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(name: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(name, default, is_prod)?.parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", name, e))
    })
}

/// OAuth credentials are optional in every environment: a provider with no
/// client id simply reports itself unconfigured at request time.
fn oauth_client_from_env(prefix: &str, provider: &str) -> Result<OAuthClientConfig, AppError> {
    Ok(OAuthClientConfig {
        client_id: get_env(&format!("{}_CLIENT_ID", prefix), Some(""), false)?,
        client_secret: get_env(&format!("{}_CLIENT_SECRET", prefix), Some(""), false)?,
        redirect_uri: get_env(
            &format!("{}_REDIRECT_URI", prefix),
            Some(&format!(
                "http://localhost:3000/api/auth/oauth/{}/callback",
                provider
            )),
            false,
        )?,
    })
}
