use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use proofdesk_core::OpenAIClient;
use proofdesk_server::{app_router, AppState, Config, RecordStore, ReviewService, SqliteRepository};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        "Starting proofdesk review server {}",
        proofdesk_server::get_server_version()
    );

    let config =
        Config::from_env().context("Failed to load configuration from environment variables")?;

    let db_path = config.database_path();
    info!("Using state database: {}", db_path.display());
    let repository =
        SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?;

    let generator =
        OpenAIClient::new(config.openai()).context("Failed to create OpenAI client")?;
    info!("Generating descriptions with {}", generator.model());

    let policy = config.lock_policy();
    info!(
        "Lock TTL {} minutes, guard checks expiry: {}, ingestion clears locks: {}",
        policy.ttl.num_minutes(),
        policy.guard_checks_expiry,
        config.ingest_clears_locks
    );

    let store = RecordStore::new(Arc::new(repository));
    let service = ReviewService::new(store, Arc::new(generator))
        .with_policy(policy)
        .with_ingest_options(config.ingest_options());

    let app_state = Arc::new(AppState {
        service,
        max_upload_bytes: config.max_upload_bytes,
    });
    let app = app_router(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
