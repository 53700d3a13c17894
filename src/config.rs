use std::path::{Path, PathBuf};

use axum_extra::extract::cookie::Key;
use serde::Deserialize;

use crate::error::AppError;

/// Which store holds documents (and, for `Mongo`, access sessions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    File,
}

/// Application configuration.
///
/// Loaded from an optional TOML file, then overridden by `HILFE_*`
/// environment variables (`__` separates nested keys, e.g.
/// `HILFE_VIEWER__RESET_ON_VIEW=true`). Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub viewer: ViewerConfig,
    pub unlock: UnlockConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Base URL used to build share links.
    pub public_url: String,
    /// Take the client address from `X-Forwarded-For`. Enable only behind a
    /// reverse proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            public_url: "http://localhost:3000".to_string(),
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    /// Root directory of the flat-file store.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_database: "lernhilfe".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Name of the cookie carrying the viewer session id.
    pub cookie_name: String,
    /// Re-lock all units whenever a viewer visits the share link.
    pub reset_on_view: bool,
    /// Unlock state idle for longer than this is discarded.
    pub session_ttl_hours: i64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cookie_name: "hilfe_viewer".to_string(),
            reset_on_view: false,
            session_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnlockConfig {
    /// Consecutive incorrect codes before a lockout; `0` disables.
    pub max_failed_attempts: u32,
    pub lockout_seconds: i64,
    /// Codes a single client may submit per minute; `0` disables.
    pub attempts_per_minute: u32,
    /// Upper bound on clients with tracked failures.
    pub max_tracked_clients: usize,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 0,
            lockout_seconds: 60,
            attempts_per_minute: 30,
            max_tracked_clients: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable the built-in demo creator accounts.
    pub demo_mode: bool,
    /// Allow documents to be created without a logged-in creator.
    pub allow_anonymous_create: bool,
    /// Secret (at least 64 bytes) signing the creator cookie. When unset a
    /// random key is generated, and logins do not survive a restart.
    pub cookie_key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            demo_mode: true,
            allow_anonymous_create: false,
            cookie_key: None,
        }
    }
}

impl AppConfig {
    /// Load the configuration from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("HILFE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// The key signing the creator cookie.
    pub fn cookie_key(&self) -> Result<Key, AppError> {
        match &self.auth.cookie_key {
            Some(secret) => Key::try_from(secret.as_bytes()).map_err(|_| {
                AppError::Config("auth.cookie_key must be at least 64 bytes long".into())
            }),
            None => {
                tracing::warn!("No auth.cookie_key configured, generating an ephemeral one");
                Ok(Key::generate())
            }
        }
    }

    /// The link handed to viewers for a document.
    pub fn share_url(&self, id: &str) -> String {
        format!("{}/hilfe/{}", self.server.public_url.trim_end_matches('/'), id)
    }
}
