//! Teleconsult Service - consultation payments and fund distribution
//!
//! This is the main entry point for the teleconsult service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use teleconsult_service::{create_router, AppState, ServiceConfig};
use teleconsult_store::{ChangeFeed, MemoryStore, Observed, PgStore, Store};

/// Pool size for the PostgreSQL backend.
const DATABASE_MAX_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,teleconsult=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Teleconsult Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = %config.database_url.is_some(),
        oauth_configured = %config.oauth_credentials().is_ok(),
        platform_configured = %config.platform_credentials().is_ok(),
        webhook_signatures = %config.mp_webhook_secret.is_some(),
        "Service configuration loaded"
    );

    let feed = ChangeFeed::new(config.feed_capacity);

    let store: Arc<dyn Store> = if let Some(url) = &config.database_url {
        tracing::info!("Connecting to PostgreSQL");
        let pg = PgStore::connect(url, DATABASE_MAX_CONNECTIONS).await?;
        Arc::new(Observed::new(pg, feed.clone()))
    } else {
        tracing::warn!("DATABASE_URL not set - using in-memory storage, data will not persist");
        Arc::new(Observed::new(MemoryStore::new(), feed.clone()))
    };

    // Build app state
    let state = AppState::new(store, feed, config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
