//! Batch commit handlers, one module per entity family.
//!
//! Shared rules, enforced by every handler:
//! - **validate before any write**: a rejected item never touches the db
//! - **commit atomically per logical unit**: one transaction per item
//! - **never trust client-computed money totals**: recompute server-side
//! - idempotency on `client_ref`: replaying a batch after an ambiguous
//!   network failure commits each fact at most once

pub mod cash;
pub mod due;
pub mod expenses;
pub mod products;
pub mod sales;
pub mod session;

use dukan_core::wire::BatchItemError;

/// Builds a per-item failure record.
pub(crate) fn item_err(
    client_ref: &str,
    code: &str,
    message: impl Into<String>,
    retryable: bool,
) -> BatchItemError {
    BatchItemError {
        client_ref: client_ref.to_string(),
        code: code.to_string(),
        message: message.into(),
        retryable,
    }
}

/// Maps a database failure onto a retryable item error. The transaction
/// rolls back on drop, so nothing is partially visible.
pub(crate) fn db_item_err(client_ref: &str, err: sqlx::Error) -> BatchItemError {
    item_err(client_ref, "DB_ERROR", err.to_string(), true)
}
