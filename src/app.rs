use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::Key;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::access::session::AccessSessionStore;
use crate::access::throttle::UnlockThrottle;
use crate::api;
use crate::auth::demo_auth;
use crate::config::AppConfig;
use crate::db::repository::DocumentRepository;
use crate::error::AppError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub document_repo: Arc<dyn DocumentRepository>,
    pub access_sessions: Arc<dyn AccessSessionStore>,
    pub unlock_throttle: Arc<UnlockThrottle>,
    pub config: Arc<AppConfig>,
    /// Signs the creator cookie.
    pub cookie_key: Key,
}

impl AppState {
    /// Build state with a throttle configured from `config.unlock` and the
    /// cookie key from `config.auth`.
    pub fn new(
        document_repo: Arc<dyn DocumentRepository>,
        access_sessions: Arc<dyn AccessSessionStore>,
        config: AppConfig,
    ) -> Result<Self, AppError> {
        let unlock_throttle = Arc::new(UnlockThrottle::from_config(&config.unlock));
        let cookie_key = config.cookie_key()?;

        Ok(Self {
            document_repo,
            access_sessions,
            unlock_throttle,
            config: Arc::new(config),
            cookie_key,
        })
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Build the Axum router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Creator identity (demo)
        .route("/api/auth/login", post(demo_auth::login_handler))
        .route("/api/auth/me", get(demo_auth::me_handler))
        .route("/api/auth/logout", post(demo_auth::logout_handler))
        // Documents
        .route(
            "/api/v1/hilfen",
            get(api::hilfen::dashboard_handler).post(api::hilfen::create_handler),
        )
        .route(
            "/api/v1/hilfen/{id}",
            get(api::hilfen::view_handler)
                .put(api::hilfen::replace_handler)
                .delete(api::hilfen::delete_handler),
        )
        .route(
            "/api/v1/hilfen/{id}/edit",
            get(api::hilfen::edit_view_handler),
        )
        .route(
            "/api/v1/hilfen/{id}/unlock/{index}",
            post(api::hilfen::unlock_handler),
        )
        // Share link
        .route("/hilfe/{id}", get(api::hilfen::visit_handler))
        .route(
            "/hilfe/{id}/unlock/{index}",
            post(api::hilfen::unlock_form_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
