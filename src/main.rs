use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use lernhilfe::access::session::{AccessSessionStore, MemoryAccessSessionStore};
use lernhilfe::app::{router, AppState};
use lernhilfe::config::{AppConfig, StorageBackend};
use lernhilfe::db::file_repository::FileDocumentRepository;
use lernhilfe::db::repository::DocumentRepository;

/// Share study aids whose units unlock with shared codes.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lernhilfe=info,tower_http=info".into()),
        )
        .init();

    tracing::info!("Starting Lernhilfe server...");

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let session_ttl = chrono::Duration::hours(config.viewer.session_ttl_hours);

    let (document_repo, access_sessions): (
        Arc<dyn DocumentRepository>,
        Arc<dyn AccessSessionStore>,
    ) = match config.storage.backend {
        StorageBackend::File => {
            let repo = FileDocumentRepository::open(config.storage.data_dir.join("hilfen")).await?;
            tracing::info!(
                "Using flat-file store at {}",
                config.storage.data_dir.display()
            );

            let sessions = Arc::new(MemoryAccessSessionStore::new());
            spawn_session_purge(sessions.clone(), session_ttl);

            let repo: Arc<dyn DocumentRepository> = Arc::new(repo);
            let sessions: Arc<dyn AccessSessionStore> = sessions;
            (repo, sessions)
        }
        #[cfg(feature = "mongo")]
        StorageBackend::Mongo => {
            use lernhilfe::access::session::MongoAccessSessionStore;
            use lernhilfe::db::repository::MongoDocumentRepository;

            let mongo_client = mongodb::Client::with_uri_str(&config.storage.mongodb_uri)
                .await
                .context("Failed to connect to MongoDB")?;
            let mongo_db = mongo_client.database(&config.storage.mongodb_database);

            let sessions = MongoAccessSessionStore::new(&mongo_db);
            sessions.ensure_indexes(session_ttl).await?;
            tracing::info!("Connected to MongoDB at {}", config.storage.mongodb_uri);

            let repo: Arc<dyn DocumentRepository> =
                Arc::new(MongoDocumentRepository::new(&mongo_db));
            let sessions: Arc<dyn AccessSessionStore> = Arc::new(sessions);
            (repo, sessions)
        }
        #[cfg(not(feature = "mongo"))]
        StorageBackend::Mongo => {
            anyhow::bail!("Built without the `mongo` feature; use storage.backend = \"file\"")
        }
    };

    if config.viewer.reset_on_view {
        tracing::info!("Share-link visits re-lock all units");
    }

    let addr = config.server.bind_addr.clone();
    let state = AppState::new(document_repo, access_sessions, config)?;
    spawn_throttle_purge(state.clone());
    let app = router(state);

    // Start the server
    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically discard idle in-memory unlock state.
fn spawn_session_purge(sessions: Arc<MemoryAccessSessionStore>, ttl: chrono::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            match sessions.purge_idle(ttl) {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {n} idle access sessions"),
                Err(e) => tracing::warn!("Failed to purge access sessions: {e}"),
            }
        }
    });
}

fn spawn_throttle_purge(state: AppState) {
    if !state.unlock_throttle.is_enabled() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = state.unlock_throttle.purge_expired(chrono::Utc::now());
            if purged > 0 {
                tracing::debug!(
                    purged,
                    tracked = state.unlock_throttle.tracked_clients(),
                    "Purged unlock throttle entries"
                );
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
