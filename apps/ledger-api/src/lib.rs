//! # Dukan Ledger API
//!
//! HTTP server for the shared ledger every device reconciles against.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ledger API Routes                               │
//! │                                                                         │
//! │  POST /v1/auth/device        API key → session token                   │
//! │  GET  /v1/session            Session probe (pause-lift check)          │
//! │  GET  /v1/health             Liveness                                  │
//! │                                                                         │
//! │  POST /v1/sync/products      ┐                                         │
//! │  POST /v1/sync/sales         │  One batch commit handler per entity    │
//! │  POST /v1/sync/expenses      │  family: validate → per-item            │
//! │  POST /v1/sync/cash          │  transaction → canonical ids back       │
//! │  POST /v1/sync/due-customers │                                         │
//! │  POST /v1/sync/due-payments  ┘                                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Infrastructure                               │  │
//! │  │   SQLite ledger   ·   JWT sessions   ·   Redis pub/sub fan-out   │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `PORT` - HTTP listen port (default: 8080)
//! - `LEDGER_DATABASE_PATH` - SQLite database path
//! - `REDIS_URL` - Redis connection string (optional)
//! - `JWT_SECRET` - Secret for session token signing
//! - `STOCK_POLICY` - `allow_negative` (default) or `flag_discrepancy`

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod realtime;

// Re-exports
pub use auth::JwtManager;
pub use config::{LedgerConfig, StockPolicy};
pub use db::LedgerDb;
pub use error::ApiError;
pub use realtime::{NoopPublisher, RealtimePublisher, RecordingPublisher, RedisPublisher};

/// Shared application state.
pub struct AppState {
    pub db: LedgerDb,
    pub config: LedgerConfig,
    pub jwt: JwtManager,
    pub realtime: Arc<dyn RealtimePublisher>,
}

/// Builds the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/auth/device", post(handlers::session::device_auth))
        .route("/v1/session", get(handlers::session::session_probe))
        .route("/v1/sync/products", post(handlers::products::commit_products))
        .route("/v1/sync/sales", post(handlers::sales::commit_sales))
        .route("/v1/sync/expenses", post(handlers::expenses::commit_expenses))
        .route("/v1/sync/cash", post(handlers::cash::commit_cash))
        .route(
            "/v1/sync/due-customers",
            post(handlers::due::commit_due_customers),
        )
        .route(
            "/v1/sync/due-payments",
            post(handlers::due::commit_due_payments),
        )
        .with_state(state)
}

/// Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
