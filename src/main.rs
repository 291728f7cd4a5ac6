// Charter dispatch server
// Compile: cargo build --bin charter-server
// Run: CHARTER_DATABASE_URL=postgres://... cargo run --bin charter-server

mod config;

use charter_application::{CommitmentReaper, DispatchService, ReaperConfig};
use charter_infrastructure::{DatabaseConfig, PostgresDispatchStore};
use config::ServerConfig;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let store = PostgresDispatchStore::connect(&DatabaseConfig::new(
        config.database_url.clone(),
        config.db_max_connections,
        config.db_connect_timeout,
    ))
    .await?;
    store.run_migrations().await?;
    let store = Arc::new(store);

    let service = DispatchService::new(store.clone());

    let reaper = CommitmentReaper::new(
        store,
        ReaperConfig {
            enabled: config.reaper_enabled,
            silence_threshold: chrono::Duration::from_std(config.reaper_silence)?,
            check_interval: config.reaper_interval,
        },
    );
    if reaper.spawn().is_some() {
        info!("commitment reaper enabled");
    }

    let app = charter_api::router(service);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    info!(address = %config.bind_address, "charter dispatch server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
