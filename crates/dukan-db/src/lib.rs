//! # dukan-db: Local Operation Store for Dukan POS
//!
//! Device-resident SQLite storage: the durable queue of pending operations
//! plus read-optimized mirrors of recent business entities for offline UI
//! rendering.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dukan POS Data Flow                               │
//! │                                                                         │
//! │  UI action (record sale)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     dukan-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (queue.rs,   │    │  (embedded)  │  │   │
//! │  │   │               │    │   mirrors)    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ QueueRepo     │    │ 001_local_   │  │   │
//! │  │   │ WAL mode      │    │ MirrorRepos   │    │ store.sql    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  dukan-sync drains the queue against the ledger API                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Local store error types
//! - [`repository`] - Queue, mirror, and account repositories

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
pub use repository::cash::CashMirrorRepository;
pub use repository::expense::ExpenseMirrorRepository;
pub use repository::product::ProductMirrorRepository;
pub use repository::queue::QueueRepository;
pub use repository::sale::SaleMirrorRepository;
