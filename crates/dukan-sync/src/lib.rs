//! # dukan-sync: Offline-First Sync Engine for Dukan POS
//!
//! This crate reconciles the device-local operation queue with the shared
//! ledger, exactly once per operation, while the shop keeps selling through
//! connectivity gaps.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────┐    ┌───────────────────────────────────────────────┐ │
//! │  │ QueueManager │    │                SyncEngine                     │ │
//! │  │              │    │                                               │ │
//! │  │ Typed        │    │  • Single-flight run loop                     │ │
//! │  │ enqueue with │    │  • FIFO drain, partitioned by family          │ │
//! │  │ validation   │    │  • Independent per-family batch submission    │ │
//! │  └──────┬───────┘    │  • Retry / dead-letter bookkeeping            │ │
//! │         │            │  • Auth pause with cooldown                   │ │
//! │         ▼            └───────▲───────────────────────┬───────────────┘ │
//! │  ┌──────────────┐            │                       │                 │
//! │  │  dukan-db    │    ┌───────┴───────┐       ┌───────▼──────────────┐  │
//! │  │  sync_queue  │    │  SyncTrigger  │       │  BatchApi (HTTP)     │  │
//! │  │  + mirrors   │    │               │       │                      │  │
//! │  └──────────────┘    │ reconnect /   │       │ POST /v1/sync/...    │  │
//! │                      │ interval /    │       │ GET  /v1/session     │  │
//! │                      │ visibility /  │       └──────────────────────┘  │
//! │                      │ worker        │                                 │
//! │                      └───────────────┘                                 │
//! │                                                                         │
//! │  LIFECYCLE EVENTS (broadcast channel):                                 │
//! │  • Started / BatchCommitted / BatchFailed / Finished                   │
//! │  • Paused / Resumed                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - The single-flight drain orchestrator
//! - [`trigger`] - Four trigger sources converging on one run call
//! - [`queue`] - UI-facing queue manager (typed enqueue, collapse, revive)
//! - [`api`] - `BatchApi` trait and the HTTP implementation
//! - [`events`] - Typed lifecycle events
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dukan_sync::{
//!     EngineSettings, HttpBatchApi, SyncConfig, SyncEngine, SyncTrigger,
//! };
//!
//! let config = SyncConfig::load_or_default(None);
//! let api = HttpBatchApi::new(
//!     config.server_url().unwrap(),
//!     std::time::Duration::from_secs(config.sync.request_timeout_secs),
//! )?;
//!
//! let (engine, engine_handle) =
//!     SyncEngine::new(api, db, EngineSettings::from(&config), online_rx.clone());
//! let (trigger, trigger_handle) =
//!     SyncTrigger::new(engine_handle.clone(), online_rx, config.interval());
//!
//! tokio::spawn(engine.run());
//! tokio::spawn(trigger.run());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod queue;
pub mod trigger;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{BatchApi, HttpBatchApi};
pub use config::{DeviceConfig, ServerConfig, SyncConfig, SyncSettings};
pub use engine::{EngineSettings, RunOutcome, RunSummary, SyncEngine, SyncEngineHandle, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use events::{SyncEvent, TriggerSource};
pub use queue::QueueManager;
pub use trigger::{SyncTrigger, SyncTriggerHandle};
