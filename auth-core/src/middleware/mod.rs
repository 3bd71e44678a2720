mod auth;

pub use auth::{extract_token, optional_auth, require_auth, AuthUser, CurrentUser};
