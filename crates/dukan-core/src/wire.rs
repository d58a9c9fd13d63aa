//! # Wire Types
//!
//! The batch endpoint contract shared by the device engine and the ledger
//! server. One request/response shape per entity family:
//!
//! ```text
//! POST /v1/sync/sales          { "newItems": [SalePayload, ...] }
//! POST /v1/sync/expenses       { "newItems": [ExpensePayload, ...] }
//! POST /v1/sync/cash           { "newItems": [CashEntryPayload, ...] }
//! POST /v1/sync/due-customers  { "newItems": [DueCustomerPayload, ...] }
//! POST /v1/sync/due-payments   { "newItems": [DuePaymentPayload, ...] }
//! POST /v1/sync/products       { "newItems": [...], "updatedItems": [...],
//!                                "deletedIds": [...] }
//!
//! → { "success": bool, "ids": [CommittedId, ...],
//!     "errors": [BatchItemError, ...] }
//! ```
//!
//! A batch is never partially visible: each item commits in its own
//! transaction and reports back under its `client_ref`, so the engine can
//! delete exactly the queue entries that made it.

use serde::{Deserialize, Serialize};

use crate::operation::{
    CashEntryPayload, DueCustomerPayload, DuePaymentPayload, ExpensePayload, ProductPayload,
    SalePayload,
};

// =============================================================================
// Requests
// =============================================================================

/// Batch of sale creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleBatchRequest {
    pub new_items: Vec<SalePayload>,
}

/// Batch of expense creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseBatchRequest {
    pub new_items: Vec<ExpensePayload>,
}

/// Batch of manual cash movements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashBatchRequest {
    pub new_items: Vec<CashEntryPayload>,
}

/// Batch of due-customer creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueCustomerBatchRequest {
    pub new_items: Vec<DueCustomerPayload>,
}

/// Batch of due-payment records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuePaymentBatchRequest {
    pub new_items: Vec<DuePaymentPayload>,
}

/// Product batch. The only mutable entity family, so it carries updates and
/// deletions alongside creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBatchRequest {
    pub new_items: Vec<ProductPayload>,
    pub updated_items: Vec<ProductPayload>,
    pub deleted_ids: Vec<String>,
}

impl ProductBatchRequest {
    pub fn is_empty(&self) -> bool {
        self.new_items.is_empty() && self.updated_items.is_empty() && self.deleted_ids.is_empty()
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Canonical identity assigned by the ledger for one committed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedId {
    /// Echo of the client's reference for this item.
    pub client_ref: String,
    /// Server-assigned id the mirror reconciles against.
    pub server_id: String,
    /// Shop-scoped invoice number; sales only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_no: Option<i64>,
}

/// Per-item failure inside an otherwise-processed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub client_ref: String,
    /// Machine-readable code, e.g. `PRODUCT_NOT_FOUND`, `TOTAL_MISMATCH`.
    pub code: String,
    pub message: String,
    /// False for validation failures: the engine moves the entry to dead
    /// instead of burning its retry budget.
    pub retryable: bool,
}

/// Batch endpoint response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    /// True when every item committed.
    pub success: bool,
    pub ids: Vec<CommittedId>,
    pub errors: Vec<BatchItemError>,
}

impl BatchResponse {
    /// Builds a response from accumulated per-item outcomes.
    pub fn from_outcomes(ids: Vec<CommittedId>, errors: Vec<BatchItemError>) -> Self {
        BatchResponse {
            success: errors.is_empty(),
            ids,
            errors,
        }
    }
}

// =============================================================================
// Session & Enrollment
// =============================================================================

/// Device enrollment request: exchanges a shop API key for a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthRequest {
    pub shop_id: String,
    pub device_id: String,
    pub api_key: String,
}

/// Device enrollment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthResponse {
    pub token: String,
    pub expires_in_secs: i64,
}

/// Session probe response (`GET /v1/session`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub shop_id: String,
    pub device_id: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_field_names_are_camel_case() {
        let req = ProductBatchRequest::default();
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("newItems"));
        assert!(json.contains("updatedItems"));
        assert!(json.contains("deletedIds"));
    }

    #[test]
    fn test_response_success_tracks_errors() {
        let ok = BatchResponse::from_outcomes(vec![], vec![]);
        assert!(ok.success);

        let failed = BatchResponse::from_outcomes(
            vec![],
            vec![BatchItemError {
                client_ref: "ref-1".to_string(),
                code: "TOTAL_MISMATCH".to_string(),
                message: "client sent 10, recomputed 12".to_string(),
                retryable: false,
            }],
        );
        assert!(!failed.success);
    }

    #[test]
    fn test_invoice_no_omitted_when_absent() {
        let id = CommittedId {
            client_ref: "ref-1".to_string(),
            server_id: "srv-1".to_string(),
            invoice_no: None,
        };
        let json = serde_json::to_string(&id).unwrap();
        assert!(!json.contains("invoiceNo"));
    }
}
