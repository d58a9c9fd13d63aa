//! # Queue Operations
//!
//! The typed unit of deferred work: everything a clerk does offline becomes
//! one [`QueueOperation`] whose payload is a **closed tagged union**: one
//! variant per valid `(type, action)` pair, validated at enqueue time so a
//! malformed payload is caught at the point of creation, never at sync time.
//!
//! ## Operation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     QueueOperation Lifecycle                            │
//! │                                                                         │
//! │  UI action                                                             │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  payload.validate() ──err──► surfaced synchronously, nothing queued    │
//! │     │ ok                                                                │
//! │     ▼                                                                   │
//! │  queued (durable, immutable) ──run──► in-flight                        │
//! │     │                                    │                              │
//! │     │                      ┌─────────────┼──────────────┐               │
//! │     │                      ▼             ▼              ▼               │
//! │     │                  removed     retry_count+1      dead              │
//! │     │                 (acked)      (transient)    (ceiling / rejected)  │
//! │     │                                                                   │
//! │  Corrections are NEW operations: a partially-transmitted-then-         │
//! │  retried mutation would be unsafe to merge.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::line_total_cents;
use crate::types::{CashDirection, OpAction, OpType, PaymentMethod, QueueState};

// =============================================================================
// Payload Types
// =============================================================================

/// Product fields for creates and updates.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    /// Client-generated natural key (UUID v4).
    pub client_ref: String,
    /// Canonical ledger id; present on updates, absent on creates.
    pub product_id: Option<String>,
    pub name: String,
    pub price_cents: i64,
    pub cost_cents: Option<i64>,
    pub stock_qty: i64,
    pub track_stock: bool,
    pub is_active: bool,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// Product deletion. Soft-deletes server-side.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductDeletePayload {
    /// The product to delete: ledger id for synced rows, client ref for a
    /// create still in the queue (which collapses instead of transmitting).
    pub product_id: String,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// One line of a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleLinePayload {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// A completed sale recorded offline.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SalePayload {
    pub client_ref: String,
    pub lines: Vec<SaleLinePayload>,
    pub payment_method: PaymentMethod,
    /// Required when `payment_method` is `Due`.
    pub customer_id: Option<String>,
    /// Client-computed total, cross-check only. The ledger recomputes from
    /// lines and rejects the item if the two disagree.
    pub total_cents: Option<i64>,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

impl SalePayload {
    /// Recomputes the total from line items.
    pub fn computed_total_cents(&self) -> i64 {
        line_total_cents(
            self.lines
                .iter()
                .map(|l| (l.quantity, l.unit_price_cents)),
        )
    }
}

/// An expense recorded offline.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ExpensePayload {
    pub client_ref: String,
    pub category: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// A manual cash-in / cash-out movement.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CashEntryPayload {
    pub client_ref: String,
    pub direction: CashDirection,
    pub amount_cents: i64,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// A new due (store-credit) customer, optionally with an opening balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DueCustomerPayload {
    pub client_ref: String,
    pub name: String,
    pub phone: Option<String>,
    pub opening_due_cents: i64,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// A payment received against a customer's due balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DuePaymentPayload {
    pub client_ref: String,
    pub customer_id: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Operation Payload (closed tagged union)
// =============================================================================

/// Every valid `(type, action)` pair, as one serde-tagged enum.
///
/// The tag set is closed by construction: there is no variant for an
/// invalid pairing such as a sale update, so one cannot be queued.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationPayload {
    ProductCreate(ProductPayload),
    ProductUpdate(ProductPayload),
    ProductDelete(ProductDeletePayload),
    SaleCreate(SalePayload),
    ExpenseCreate(ExpensePayload),
    CashCreate(CashEntryPayload),
    DueCustomerCreate(DueCustomerPayload),
    DuePaymentCreate(DuePaymentPayload),
}

impl OperationPayload {
    /// The entity family this payload targets.
    pub fn op_type(&self) -> OpType {
        match self {
            OperationPayload::ProductCreate(_)
            | OperationPayload::ProductUpdate(_)
            | OperationPayload::ProductDelete(_) => OpType::Product,
            OperationPayload::SaleCreate(_) => OpType::Sale,
            OperationPayload::ExpenseCreate(_) => OpType::Expense,
            OperationPayload::CashCreate(_) => OpType::Cash,
            OperationPayload::DueCustomerCreate(_) => OpType::DueCustomer,
            OperationPayload::DuePaymentCreate(_) => OpType::DuePayment,
        }
    }

    /// The action this payload performs.
    pub fn action(&self) -> OpAction {
        match self {
            OperationPayload::ProductCreate(_)
            | OperationPayload::SaleCreate(_)
            | OperationPayload::ExpenseCreate(_)
            | OperationPayload::CashCreate(_)
            | OperationPayload::DueCustomerCreate(_) => OpAction::Create,
            OperationPayload::ProductUpdate(_) => OpAction::Update,
            OperationPayload::ProductDelete(_) => OpAction::Delete,
            OperationPayload::DuePaymentCreate(_) => OpAction::Payment,
        }
    }

    /// The client-generated natural key used for dedup and create+delete
    /// collapse.
    pub fn natural_key(&self) -> &str {
        match self {
            OperationPayload::ProductCreate(p) | OperationPayload::ProductUpdate(p) => {
                &p.client_ref
            }
            OperationPayload::ProductDelete(p) => &p.product_id,
            OperationPayload::SaleCreate(p) => &p.client_ref,
            OperationPayload::ExpenseCreate(p) => &p.client_ref,
            OperationPayload::CashCreate(p) => &p.client_ref,
            OperationPayload::DueCustomerCreate(p) => &p.client_ref,
            OperationPayload::DuePaymentCreate(p) => &p.client_ref,
        }
    }

    /// Validates the payload. Runs at enqueue time.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            OperationPayload::ProductCreate(p) | OperationPayload::ProductUpdate(p) => {
                require_ref("clientRef", &p.client_ref)?;
                require_text("name", &p.name, 200)?;
                require_positive("priceCents", p.price_cents)?;
                Ok(())
            }
            OperationPayload::ProductDelete(p) => require_ref("productId", &p.product_id),
            OperationPayload::SaleCreate(p) => {
                require_ref("clientRef", &p.client_ref)?;
                if p.lines.is_empty() {
                    return Err(ValidationError::EmptySale);
                }
                for line in &p.lines {
                    require_ref("productId", &line.product_id)?;
                    require_positive("quantity", line.quantity)?;
                    require_positive("unitPriceCents", line.unit_price_cents)?;
                }
                if p.payment_method == PaymentMethod::Due
                    && p.customer_id.as_deref().map_or(true, str::is_empty)
                {
                    return Err(ValidationError::DueWithoutCustomer);
                }
                Ok(())
            }
            OperationPayload::ExpenseCreate(p) => {
                require_ref("clientRef", &p.client_ref)?;
                require_text("category", &p.category, 100)?;
                require_positive("amountCents", p.amount_cents)?;
                Ok(())
            }
            OperationPayload::CashCreate(p) => {
                require_ref("clientRef", &p.client_ref)?;
                require_positive("amountCents", p.amount_cents)?;
                Ok(())
            }
            OperationPayload::DueCustomerCreate(p) => {
                require_ref("clientRef", &p.client_ref)?;
                require_text("name", &p.name, 200)?;
                if p.opening_due_cents < 0 {
                    return Err(ValidationError::MustBePositive {
                        field: "openingDueCents".to_string(),
                    });
                }
                Ok(())
            }
            OperationPayload::DuePaymentCreate(p) => {
                require_ref("clientRef", &p.client_ref)?;
                require_ref("customerId", &p.customer_id)?;
                require_positive("amountCents", p.amount_cents)?;
                Ok(())
            }
        }
    }
}

fn require_ref(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn require_text(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

fn require_positive(field: &str, value: i64) -> Result<(), ValidationError> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Queue Operation
// =============================================================================

/// A durable queue entry: a validated payload plus bookkeeping fields.
///
/// `id` is assigned by the local store and never leaves the device; the
/// ledger only ever sees the payload and its `client_ref`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueueOperation {
    pub id: i64,
    pub account_id: String,
    pub op_type: OpType,
    pub action: OpAction,
    pub natural_key: String,
    pub payload: OperationPayload,
    pub state: QueueState,
    pub retry_count: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sale_payload() -> SalePayload {
        SalePayload {
            client_ref: "ref-1".to_string(),
            lines: vec![SaleLinePayload {
                product_id: "prod-1".to_string(),
                quantity: 2,
                unit_price_cents: 150,
            }],
            payment_method: PaymentMethod::Cash,
            customer_id: None,
            total_cents: None,
            note: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_sale_total_recompute() {
        let mut p = sale_payload();
        p.lines.push(SaleLinePayload {
            product_id: "prod-2".to_string(),
            quantity: 1,
            unit_price_cents: 700,
        });
        assert_eq!(p.computed_total_cents(), 1000);
    }

    #[test]
    fn test_sale_validation() {
        let p = OperationPayload::SaleCreate(sale_payload());
        assert!(p.validate().is_ok());

        let mut empty = sale_payload();
        empty.lines.clear();
        let p = OperationPayload::SaleCreate(empty);
        assert!(matches!(p.validate(), Err(ValidationError::EmptySale)));

        let mut due = sale_payload();
        due.payment_method = PaymentMethod::Due;
        let p = OperationPayload::SaleCreate(due);
        assert!(matches!(
            p.validate(),
            Err(ValidationError::DueWithoutCustomer)
        ));
    }

    #[test]
    fn test_type_action_pairing() {
        let p = OperationPayload::SaleCreate(sale_payload());
        assert_eq!(p.op_type(), OpType::Sale);
        assert_eq!(p.action(), OpAction::Create);

        let p = OperationPayload::DuePaymentCreate(DuePaymentPayload {
            client_ref: "ref-2".to_string(),
            customer_id: "cust-1".to_string(),
            amount_cents: 500,
            recorded_at: Utc::now(),
        });
        assert_eq!(p.op_type(), OpType::DuePayment);
        assert_eq!(p.action(), OpAction::Payment);
    }

    #[test]
    fn test_payload_serde_roundtrip() {
        let p = OperationPayload::SaleCreate(sale_payload());
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"op\":\"sale_create\""));
        let back: OperationPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.natural_key(), "ref-1");
    }

    #[test]
    fn test_negative_amount_rejected() {
        let p = OperationPayload::CashCreate(CashEntryPayload {
            client_ref: "ref-3".to_string(),
            direction: CashDirection::CashIn,
            amount_cents: -100,
            reason: None,
            recorded_at: Utc::now(),
        });
        assert!(matches!(
            p.validate(),
            Err(ValidationError::MustBePositive { .. })
        ));
    }
}
