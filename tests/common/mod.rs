#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use lernhilfe::access::session::{AccessSessionStore, MemoryAccessSessionStore};
use lernhilfe::app::{router, AppState};
use lernhilfe::config::AppConfig;
use lernhilfe::db::file_repository::FileDocumentRepository;
use lernhilfe::db::repository::DocumentRepository;

/// Holds a flat-file store in a temporary directory and the Axum router
/// wired to it.
///
/// The directory is removed when this struct is dropped.
pub struct TestEnv {
    _data_dir: TempDir,
    pub router: Router,
    pub repo: Arc<dyn DocumentRepository>,
    pub sessions: Arc<MemoryAccessSessionStore>,
}

impl TestEnv {
    /// Start with the default configuration.
    pub async fn start() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    /// Start with a caller-tweaked configuration.
    pub async fn with_config(mut config: AppConfig) -> Self {
        let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
        config.storage.data_dir = data_dir.path().to_path_buf();

        let repo: Arc<dyn DocumentRepository> = Arc::new(
            FileDocumentRepository::open(data_dir.path().join("hilfen"))
                .await
                .expect("Failed to open file store"),
        );
        let sessions = Arc::new(MemoryAccessSessionStore::new());
        let dyn_sessions: Arc<dyn AccessSessionStore> = sessions.clone();

        let state =
            AppState::new(repo.clone(), dyn_sessions, config).expect("Failed to build app state");
        let router = router(state);

        Self {
            _data_dir: data_dir,
            router,
            repo,
            sessions,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    ///
    /// Each server keeps its own cookies, so two servers act as two
    /// independent browsers.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .build(self.router.clone())
    }

    /// Helper: log in as one of the demo creators.
    pub async fn login(&self, server: &axum_test::TestServer, username: &str) {
        server
            .post("/api/auth/login")
            .json(&serde_json::json!({
                "username": username,
                "password": username
            }))
            .expect_success()
            .await;
    }

    /// Helper: create a document via the API and return its id.
    pub async fn create(&self, server: &axum_test::TestServer, body: serde_json::Value) -> String {
        let response = server
            .post("/api/v1/hilfen")
            .json(&body)
            .expect_success()
            .await;
        let created: serde_json::Value = response.json();
        created["id"]
            .as_str()
            .expect("create response without id")
            .to_string()
    }
}

/// The worked example: three units, two sharing the code "42".
pub fn algebra() -> serde_json::Value {
    serde_json::json!({
        "title": "Algebra",
        "subject": "Mathematik",
        "units": [
            { "name": "Intro", "content": "Read me first." },
            { "name": "Hint 1", "content": "Try x = 3.", "locked": true, "lock_code": "42" },
            { "name": "Hint 2", "content": "Substitute back.", "locked": true, "lock_code": "42" }
        ]
    })
}
