//! # upkeep-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the maintenance request service.
//! Binds to the configured port (default 8080).

use std::sync::Arc;

use upkeep_api::config::ApiConfig;
use upkeep_api::state::AppState;
use upkeep_dispatch::{LogNotifier, NotificationDispatcher};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {e}");
        e
    })?;
    tracing::info!(?config, "configuration loaded");

    // Absent DATABASE_URL means in-memory only.
    let db_pool = upkeep_api::db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let port = config.port;
    let state = AppState::build(config, db_pool).map_err(|e| {
        tracing::error!("Bootstrap failed: {e}");
        e
    })?;

    // Notifications run off the request path; failures are logged there.
    let _notifications =
        NotificationDispatcher::spawn(state.engine.bus().subscribe(), Arc::new(LogNotifier));

    let app = upkeep_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("upkeep API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
