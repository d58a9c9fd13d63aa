//! # Dukan Ledger API
//!
//! Server binary: loads configuration, connects the ledger database and the
//! optional Redis fan-out, and serves the batch commit endpoints.
//!
//! ```text
//! Device engine ───► HTTP (8080) ───► Batch handlers ───► SQLite ledger
//!                                          │
//!                                          ▼
//!                                        Redis
//!                                      (Pub/Sub)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ledger_api::{
    config::LedgerConfig, db::LedgerDb, realtime::NoopPublisher, realtime::RealtimePublisher,
    realtime::RedisPublisher, AppState, JwtManager,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting Dukan Ledger API server...");

    // Load configuration
    let config = LedgerConfig::load()?;
    info!(
        port = config.port,
        db_path = %config.database_path,
        stock_policy = ?config.stock_policy,
        "Configuration loaded"
    );

    // Connect to the ledger database (runs migrations)
    let db = LedgerDb::connect(&config.database_path).await?;
    info!("Ledger database ready");

    // Connect to Redis (optional)
    let realtime: Arc<dyn RealtimePublisher> = match config.redis_url {
        Some(ref url) => match RedisPublisher::connect(url).await {
            Ok(publisher) => {
                info!("Connected to Redis for realtime fan-out");
                Arc::new(publisher)
            }
            Err(e) => {
                warn!(?e, "Failed to connect to Redis, continuing without fan-out");
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };

    // Create shared state
    let jwt = JwtManager::new(config.jwt_secret.clone(), config.jwt_lifetime_secs);
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        jwt,
        realtime,
    });

    // Serve
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, ledger_api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
