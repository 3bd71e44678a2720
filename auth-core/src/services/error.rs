use thiserror::Error;

use crate::error::AppError;

/// Typed failures raised by the auth components. The facade adds context
/// but never swallows these; the conversion into [`AppError`] maps each
/// class to its transport status.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    // -- validation --
    #[error("Password too weak: {0}")]
    WeakPassword(&'static str),

    // -- authentication --
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Invalid or expired OAuth state")]
    InvalidOAuthState,

    #[error("Sign-in was cancelled at the provider")]
    ConsentDenied,

    // -- authorization --
    #[error("Account is not active. Contact support.")]
    AccountDisabled,

    #[error("Tenant subscription is cancelled")]
    TenantSuspended,

    #[error("Password was used recently. Choose a password you have not used before.")]
    PasswordReused,

    #[error("This account signs in with {0}. Use social login instead.")]
    UseSocialLogin(String),

    // -- rate limiting --
    #[error("Account locked. Try again in {minutes_remaining} minutes.")]
    AccountLocked { minutes_remaining: i64 },

    // -- conflicts / lookups --
    #[error("Email already registered")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    // -- OAuth providers --
    #[error("OAuth provider \"{0}\" is not supported")]
    ProviderUnsupported(String),

    #[error("{0} OAuth is not configured")]
    ProviderNotConfigured(&'static str),

    #[error("OAuth callback is missing required parameters")]
    MalformedCallback,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Could not obtain a verified email from {0}")]
    EmailUnavailable(&'static str),

    #[error("OAuth provider request failed: {0}")]
    ProviderRequest(#[from] reqwest::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::WeakPassword(_) => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::InvalidCredentials
            | ServiceError::TokenExpired
            | ServiceError::TokenInvalid
            | ServiceError::TokenRevoked
            | ServiceError::InvalidRefreshToken
            | ServiceError::InvalidOAuthState
            | ServiceError::ConsentDenied => AppError::Unauthorized(anyhow::anyhow!("{}", err)),
            ServiceError::AccountDisabled | ServiceError::TenantSuspended => {
                AppError::Forbidden(anyhow::anyhow!("{}", err))
            }
            ServiceError::PasswordReused | ServiceError::UseSocialLogin(_) => {
                AppError::BadRequest(anyhow::anyhow!("{}", err))
            }
            ServiceError::AccountLocked { minutes_remaining } => AppError::TooManyRequests(
                err.to_string(),
                Some((minutes_remaining.max(0) as u64) * 60),
            ),
            ServiceError::EmailTaken => AppError::Conflict(anyhow::anyhow!("{}", err)),
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("{}", err)),
            ServiceError::ProviderUnsupported(_)
            | ServiceError::MalformedCallback
            | ServiceError::TokenExchange(_)
            | ServiceError::EmailUnavailable(_) => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ServiceError::ProviderNotConfigured(_) => {
                AppError::InternalError(anyhow::anyhow!("{}", err))
            }
            ServiceError::ProviderRequest(e) => AppError::BadGateway(e.to_string()),
        }
    }
}
