use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use signal_relay::config::{Config, EnvConfig, StoreBackend};
use signal_relay::delivery::push::ExpoPushClient;
use signal_relay::monitoring::logger::CsvLogger;
use signal_relay::pipeline::Pipeline;
use signal_relay::server::{router, AppState};
use signal_relay::storage::memory::MemoryStore;
use signal_relay::storage::persistence::{SignalStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("🚀 Signal relay starting...");

    // Load configuration
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    tracing::info!("Loading configuration from {}", config_path);
    let mut config = Config::load(&config_path)?;
    let env_config = EnvConfig::load()?;
    config.apply_env(&env_config);
    config.validate()?;

    tracing::info!("Dry run mode: {}", config.system.dry_run);
    tracing::info!(
        "Push chunk size: {}, concurrency: {}",
        config.push.chunk_size,
        config.push.max_concurrent_chunks
    );

    let store: Arc<dyn SignalStore> = match config.storage.backend {
        StoreBackend::Sqlite => {
            tracing::info!("Initializing database: {}", config.storage.database_path);
            let db = SqliteStore::new(&config.storage.database_path)
                .context("Failed to open signal database")?;
            tracing::info!("Stored signals: {}", db.count_signals()?);
            Arc::new(db)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; signals are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if env_config.push_access_token.is_none() {
        tracing::info!("PUSH_ACCESS_TOKEN not set, sending unauthenticated");
    }
    let provider = Arc::new(
        ExpoPushClient::new(&config.push, env_config.push_access_token.clone())
            .context("Failed to build push client")?,
    );

    let audit = if config.monitoring.csv_audit {
        Some(CsvLogger::new(config.monitoring.csv_audit_path.clone())?)
    } else {
        None
    };

    let pipeline = Pipeline::new(&config, store, provider, audit)?;
    let app = router(AppState::new(pipeline, &config.storage));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    tracing::info!("✅ Listening on {}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
