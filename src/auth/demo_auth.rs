use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::SignedCookieJar;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::middleware::{require_user, USER_COOKIE};
use crate::auth::models::AuthenticatedUser;
use crate::error::AppError;

/// `(username, password, display name)` of the built-in demo creators.
///
/// Passwords equal usernames; these accounts exist for local use only.
const DEMO_CREATORS: &[(&str, &str, &str)] = &[
    ("teacher", "teacher", "Demo Teacher"),
    ("tutor", "tutor", "Demo Tutor"),
];

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: AuthenticatedUser,
}

/// Match credentials against the demo creators.
///
/// The resulting `user_id` is `demo-<username>`, which is what documents
/// record as their owner.
pub fn authenticate_demo_user(
    username: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let (name, _, display_name) = DEMO_CREATORS
        .iter()
        .find(|(u, p, _)| *u == username && *p == password)
        .ok_or_else(|| AppError::Auth("Invalid username or password".into()))?;

    Ok(AuthenticatedUser {
        user_id: format!("demo-{name}"),
        email: format!("{name}@demo.lernhilfe.dev"),
        display_name: display_name.to_string(),
    })
}

fn user_cookie(user: &AuthenticatedUser) -> Result<Cookie<'static>, AppError> {
    let value = serde_json::to_string(user)
        .map_err(|e| AppError::Internal(format!("Failed to encode user cookie: {e}")))?;

    Ok(Cookie::build((USER_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build())
}

/// `POST /api/auth/login`
///
/// Only available while `auth.demo_mode` is on.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(SignedCookieJar, Json<LoginResponse>), AppError> {
    if !state.config.auth.demo_mode {
        return Err(AppError::Auth("Demo login is disabled".into()));
    }

    let user = authenticate_demo_user(&req.username, &req.password)?;
    let jar = jar.add(user_cookie(&user)?);
    tracing::info!(user_id = %user.user_id, "Demo creator logged in");

    Ok((
        jar,
        Json(LoginResponse {
            message: "Login successful".to_string(),
            user,
        }),
    ))
}

/// `GET /api/auth/me`
pub async fn me_handler(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<Json<AuthenticatedUser>, AppError> {
    require_user(&jar, state.config.auth.demo_mode).map(Json)
}

/// `POST /api/auth/logout`
pub async fn logout_handler(jar: SignedCookieJar) -> SignedCookieJar {
    jar.remove(Cookie::build(USER_COOKIE).path("/"))
}
