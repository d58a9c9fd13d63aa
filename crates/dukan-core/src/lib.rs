//! # dukan-core: Pure Business Logic for Dukan POS
//!
//! This crate contains side-effect-free domain logic shared by the device
//! sync engine and the ledger server.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dukan POS Core Layer                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    dukan-core (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐ │   │
//! │  │  │ Money       │  │ Operations  │  │ Wire                    │ │   │
//! │  │  │ (money.rs)  │  │(operation.rs│  │ (wire.rs)               │ │   │
//! │  │  │             │  │             │  │                         │ │   │
//! │  │  │ i64 cents   │  │ Closed      │  │ Batch request/response  │ │   │
//! │  │  │ line totals │  │ tagged union│  │ DTOs, camelCase JSON    │ │   │
//! │  │  └─────────────┘  └─────────────┘  └─────────────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │  CONSUMERS: dukan-db, dukan-sync (device) and ledger-api       │   │
//! │  │  (server). Both sides recompute totals with the SAME code.     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`money`] - Integer-cents monetary values and total recomputation
//! - [`types`] - Domain enums and local entity mirror rows
//! - [`operation`] - Typed queue operations and enqueue-time validation
//! - [`wire`] - Batch endpoint request/response contract
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod operation;
pub mod types;
pub mod wire;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{line_total_cents, Money};
pub use operation::{
    CashEntryPayload, DueCustomerPayload, DuePaymentPayload, ExpensePayload, OperationPayload,
    ProductDeletePayload, ProductPayload, QueueOperation, SaleLinePayload, SalePayload,
};
pub use types::{
    CashDirection, CashMirror, ExpenseMirror, OpAction, OpType, PaymentMethod, ProductMirror,
    QueueState, SaleMirror, SyncStatus,
};

// =============================================================================
// Constants
// =============================================================================

/// Retry ceiling applied when the sync configuration does not override it.
pub const DEFAULT_RETRY_CEILING: i64 = 5;

/// Upper bound on items per batch request accepted by the ledger.
pub const MAX_BATCH_ITEMS: usize = 500;
