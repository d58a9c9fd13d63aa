//! # Error Types
//!
//! Domain-specific error types for dukan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  dukan-core errors (this file)                                         │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Payload validation failures                    │
//! │                                                                         │
//! │  dukan-db errors (separate crate)                                      │
//! │  └── DbError          - Local store operation failures                 │
//! │                                                                         │
//! │  dukan-sync errors (separate crate)                                    │
//! │  └── SyncError        - Engine, queue, and transport failures          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → Frontend    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (refs, amounts, etc.)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// They should be caught and translated to user-friendly messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A queued operation's payload failed validation at enqueue time.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An action was requested on an operation type that does not support it.
    ///
    /// ## When This Occurs
    /// - A `sale` operation with anything other than `create`
    /// - A `due_payment` operation with anything other than `payment`
    #[error("Action {action} is not valid for operation type {op_type}")]
    InvalidAction { op_type: String, action: String },

    /// A client-sent total disagrees with the total recomputed from lines.
    #[error("Total mismatch: client sent {client_cents}, recomputed {computed_cents}")]
    TotalMismatch {
        client_cents: i64,
        computed_cents: i64,
    },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Payload validation errors.
///
/// These errors occur when a queue operation payload doesn't meet
/// requirements. Validation runs at enqueue time so malformed payloads are
/// caught at the point of creation rather than at sync time.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// A sale payload has no line items.
    #[error("sale must contain at least one line")]
    EmptySale,

    /// A due sale requires a customer reference.
    #[error("due sale requires a customer")]
    DueWithoutCustomer,

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::TotalMismatch {
            client_cents: 1000,
            computed_cents: 1200,
        };
        assert_eq!(
            err.to_string(),
            "Total mismatch: client sent 1000, recomputed 1200"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
