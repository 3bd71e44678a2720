//! Session cookie binding.
//!
//! The access cookie is scoped to the API prefix and the refresh cookie to
//! the auth prefix only, so the long-lived credential never travels on
//! ordinary API calls. Consumers outside this crate read tokens through
//! [`crate::middleware::extract_token`], never from cookies directly.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::AuthConfig;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

pub const ACCESS_COOKIE_PATH: &str = "/api";
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";

/// Attach both session cookies to the jar. Lifetimes track the token TTLs.
pub fn set_session_cookies(
    jar: CookieJar,
    access_token: &str,
    refresh_token: &str,
    config: &AuthConfig,
) -> CookieJar {
    let access = build_cookie(
        ACCESS_COOKIE,
        access_token.to_string(),
        ACCESS_COOKIE_PATH,
        time::Duration::minutes(config.jwt.access_token_expiry_minutes),
        config.is_prod(),
    );

    let refresh = build_cookie(
        REFRESH_COOKIE,
        refresh_token.to_string(),
        REFRESH_COOKIE_PATH,
        time::Duration::days(config.jwt.refresh_token_expiry_days),
        config.is_prod(),
    );

    jar.add(access).add(refresh)
}

/// Clear both session cookies. Paths must match the ones used when setting
/// or browsers ignore the removal.
pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    let access = Cookie::build((ACCESS_COOKIE, ""))
        .path(ACCESS_COOKIE_PATH)
        .build();
    let refresh = Cookie::build((REFRESH_COOKIE, ""))
        .path(REFRESH_COOKIE_PATH)
        .build();

    jar.remove(access).remove(refresh)
}

fn build_cookie(
    name: &'static str,
    value: String,
    path: &'static str,
    max_age: time::Duration,
    is_prod: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(path)
        .http_only(true)
        .secure(is_prod)
        .same_site(if is_prod {
            SameSite::Strict
        } else {
            SameSite::Lax
        })
        .max_age(max_age)
        .build()
}
