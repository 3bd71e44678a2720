//! Request authentication for the surrounding web layer.
//!
//! Token extraction gives the http-only cookie strict priority over the
//! `Authorization: Bearer` header (browser sessions first, API/mobile
//! clients as the fallback).

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{User, UserRole};
use crate::services::AccessTokenClaims;
use crate::utils::cookies::ACCESS_COOKIE;
use crate::AppState;

/// Extract the caller's access token. Cookie wins over header; a header
/// with any scheme other than `Bearer` yields nothing.
pub fn extract_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Authenticated caller attached to the request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub role: UserRole,
    /// Revocation handle of the presented access token.
    pub jti: String,
    /// Expiry of the presented access token (Unix seconds).
    pub exp: i64,
}

impl CurrentUser {
    fn from_parts(claims: &AccessTokenClaims, user: &User) -> Self {
        Self {
            user_id: user.user_id,
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            role: user.role(),
            jti: claims.jti.clone(),
            exp: claims.exp,
        }
    }

    pub fn require_role(&self, roles: &[UserRole]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Insufficient permissions for this action"
            )))
        }
    }

    pub fn require_tenant_owner(&self) -> Result<(), AppError> {
        self.require_role(&[UserRole::TenantOwner, UserRole::SuperAdmin])
    }

    pub fn require_super_admin(&self) -> Result<(), AppError> {
        self.require_role(&[UserRole::SuperAdmin])
    }
}

/// Middleware requiring an authenticated caller. Verifies the token
/// (signature, expiry, revocation), the user and the tenant subscription,
/// then stores [`CurrentUser`] in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&jar, req.headers()).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing authentication token"))
    })?;

    let (claims, user) = state.auth.authenticate(&token).await?;

    req.extensions_mut()
        .insert(CurrentUser::from_parts(&claims, &user));

    Ok(next.run(req).await)
}

/// Middleware that attaches [`CurrentUser`] when a valid token is present
/// and stays silent otherwise.
pub async fn optional_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(&jar, req.headers()) {
        if let Ok((claims, user)) = state.auth.authenticate(&token).await {
            req.extensions_mut()
                .insert(CurrentUser::from_parts(&claims, &user));
        }
    }

    next.run(req).await
}

/// Extractor for handlers running behind [`require_auth`].
pub struct AuthUser(pub CurrentUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let current = parts.extensions.get::<CurrentUser>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })?;

        Ok(AuthUser(current.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    fn jar_with_cookie(value: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(ACCESS_COOKIE, value.to_string()))
    }

    #[test]
    fn cookie_takes_priority_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );

        let token = extract_token(&jar_with_cookie("cookie-token"), &headers);
        assert_eq!(token.as_deref(), Some("cookie-token"));
    }

    #[test]
    fn bearer_header_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );

        let token = extract_token(&CookieJar::new(), &headers);
        assert_eq!(token.as_deref(), Some("header-token"));
    }

    #[test]
    fn non_bearer_scheme_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );

        assert_eq!(extract_token(&CookieJar::new(), &headers), None);
        assert_eq!(extract_token(&CookieJar::new(), &HeaderMap::new()), None);
    }

    #[test]
    fn role_guards() {
        let user = CurrentUser {
            user_id: Uuid::new_v4(),
            tenant_id: Some(Uuid::new_v4()),
            email: "staff@studio.test".to_string(),
            role: UserRole::Staff,
            jti: "jti".to_string(),
            exp: 0,
        };

        assert!(user.require_role(&[UserRole::Staff, UserRole::TenantOwner]).is_ok());
        assert!(user.require_tenant_owner().is_err());
        assert!(user.require_super_admin().is_err());

        let owner = CurrentUser {
            role: UserRole::TenantOwner,
            ..user
        };
        assert!(owner.require_tenant_owner().is_ok());
    }
}
