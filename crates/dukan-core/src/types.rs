//! # Domain Types
//!
//! Core domain types used throughout Dukan POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   OpType        │   │    OpAction     │   │   QueueState    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Product        │   │  Create         │   │  Pending        │       │
//! │  │  Sale           │   │  Update         │   │  Dead           │       │
//! │  │  Expense        │   │  Delete         │   └─────────────────┘       │
//! │  │  Cash           │   │  Payment        │                             │
//! │  │  DueCustomer    │   └─────────────────┘   ┌─────────────────┐       │
//! │  │  DuePayment     │                         │   SyncStatus    │       │
//! │  └─────────────────┘                         │  ─────────────  │       │
//! │                                              │  New / Updated  │       │
//! │  Mirror rows (ProductMirror, SaleMirror,     │  Deleted        │       │
//! │  ExpenseMirror, CashMirror) render the UI    │  Synced         │       │
//! │  while offline.                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Locally-created entities carry a client-generated `client_ref` (UUID v4)
//! until the ledger assigns a canonical `server_id`; the mirror row keeps
//! both so reconciliation is a single UPDATE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Queue Operation Tags
// =============================================================================

/// The entity family a queued operation targets.
///
/// A closed tag set, not subclassing: the sync engine partitions the queue
/// by this tag and each tag maps to exactly one server batch endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Product,
    Sale,
    Expense,
    Cash,
    DueCustomer,
    DuePayment,
}

impl OpType {
    /// All families, in the order the engine submits them.
    ///
    /// Due customers go before due payments and products before sales so a
    /// payload referencing a sibling create from the same run resolves
    /// server-side.
    pub const SUBMIT_ORDER: [OpType; 6] = [
        OpType::DueCustomer,
        OpType::Product,
        OpType::Sale,
        OpType::Expense,
        OpType::Cash,
        OpType::DuePayment,
    ];
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpType::Product => "product",
            OpType::Sale => "sale",
            OpType::Expense => "expense",
            OpType::Cash => "cash",
            OpType::DueCustomer => "due_customer",
            OpType::DuePayment => "due_payment",
        };
        write!(f, "{}", s)
    }
}

/// What a queued operation does to its entity.
///
/// Valid actions are a function of [`OpType`]; the pairing is enforced by
/// construction because payload variants only exist for valid pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OpAction {
    Create,
    Update,
    Delete,
    Payment,
}

/// Queue entry lifecycle state.
///
/// `queued → in-flight → {removed | queued+retry} → dead`; in-flight is
/// purely in-memory during a run, so only the durable states appear here.
/// `Dead` is reversible only via an explicit user revive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Pending,
    Dead,
}

// =============================================================================
// Mirror Sync Status
// =============================================================================

/// Distinguishes mirror rows that exist only locally from rows already
/// confirmed by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Created locally, never confirmed by the server.
    New,
    /// Exists on the server but has local edits pending.
    Updated,
    /// Locally deleted, deletion not yet confirmed.
    Deleted,
    /// Matches the server state.
    Synced,
}

// =============================================================================
// Payment Method & Cash Direction
// =============================================================================

/// How a sale was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash, collected immediately.
    Cash,
    /// Digital/wallet payment, collected immediately.
    Digital,
    /// Store credit: increases the customer's outstanding due balance.
    Due,
}

impl PaymentMethod {
    /// True when the tender lands in the cash ledger at commit time.
    pub fn is_immediate(&self) -> bool {
        !matches!(self, PaymentMethod::Due)
    }
}

/// Direction of a manual cash-ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CashDirection {
    CashIn,
    CashOut,
}

// =============================================================================
// Local Entity Mirrors
// =============================================================================

/// Product row in the device-local mirror.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductMirror {
    /// Client ref for locally-created rows; stable local key either way.
    pub id: String,
    pub account_id: String,
    /// Canonical ledger id once the create has been acknowledged.
    pub server_id: Option<String>,
    pub name: String,
    pub price_cents: i64,
    pub stock_qty: i64,
    pub track_stock: bool,
    pub is_active: bool,
    pub sync_status: SyncStatus,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Sale row in the device-local mirror.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleMirror {
    pub id: String,
    pub account_id: String,
    pub server_id: Option<String>,
    /// Shop-scoped invoice number, assigned by the ledger on commit.
    pub invoice_no: Option<i64>,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub sync_status: SyncStatus,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// Expense row in the device-local mirror.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ExpenseMirror {
    pub id: String,
    pub account_id: String,
    pub server_id: Option<String>,
    pub category: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub sync_status: SyncStatus,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// Cash-movement row in the device-local mirror.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashMirror {
    pub id: String,
    pub account_id: String,
    pub server_id: Option<String>,
    pub direction: CashDirection,
    pub amount_cents: i64,
    pub reason: Option<String>,
    pub sync_status: SyncStatus,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_immediacy() {
        assert!(PaymentMethod::Cash.is_immediate());
        assert!(PaymentMethod::Digital.is_immediate());
        assert!(!PaymentMethod::Due.is_immediate());
    }

    #[test]
    fn test_op_type_serde_tags() {
        assert_eq!(
            serde_json::to_string(&OpType::DueCustomer).unwrap(),
            "\"due_customer\""
        );
        assert_eq!(
            serde_json::from_str::<OpType>("\"due_payment\"").unwrap(),
            OpType::DuePayment
        );
    }

    #[test]
    fn test_submit_order_covers_all_families() {
        assert_eq!(OpType::SUBMIT_ORDER.len(), 6);
    }
}
