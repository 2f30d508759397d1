use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use forge_api::config::ApiConfig;
use forge_api::http;
use forge_api::llm::LlmClient;
use forge_api::pinata::PinataClient;
use forge_api::state::{ApiCache, AppState};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    forge_api::init_tracing();
    let config = ApiConfig::load().context("Failed to load configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let llm = LlmClient::new(&config.llm).context("Failed to initialize LLM client")?;
    let pinata = PinataClient::new(&config.pinata).context("Failed to initialize Pinata client")?;
    let cache = Arc::new(ApiCache::new(&config.cache));
    let app_state = AppState::new(database, cache, llm, pinata, &config.relay);

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Forge API listening on {local_addr}");

    let router: Router = http::router(app_state, &config.cors);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited with error")?;

    info!("Forge API stopped");
    Ok(())
}

async fn connect_database(config: &ApiConfig) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    Database::connect(options)
        .await
        .context("Failed to connect to the database")
}

async fn run_migrations(database: &DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}
