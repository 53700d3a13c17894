use axum_extra::extract::SignedCookieJar;

use crate::auth::models::AuthenticatedUser;
use crate::error::AppError;

/// Cookie holding the logged-in creator.
///
/// Read through a [`SignedCookieJar`], so only values this server issued
/// are accepted.
pub const USER_COOKIE: &str = "hilfe_demo_user";

/// The creator making this request, if any.
///
/// Demo identities are only honoured while `demo_mode` is on. A missing,
/// unsigned or unreadable cookie counts as anonymous.
pub fn current_user(jar: &SignedCookieJar, demo_mode: bool) -> Option<AuthenticatedUser> {
    if !demo_mode {
        return None;
    }

    let cookie = jar.get(USER_COOKIE)?;
    match serde_json::from_str(cookie.value()) {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::debug!("Ignoring invalid user cookie: {e}");
            None
        }
    }
}

/// Like [`current_user`], but fails with `Auth` for anonymous requests.
pub fn require_user(jar: &SignedCookieJar, demo_mode: bool) -> Result<AuthenticatedUser, AppError> {
    current_user(jar, demo_mode).ok_or_else(|| AppError::Auth("Not logged in".into()))
}
