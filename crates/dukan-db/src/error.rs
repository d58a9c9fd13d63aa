//! # Database Error Types
//!
//! Error types for the local operation store.
//!
//! ## Why QuotaExceeded Is Its Own Variant
//! Losing a queued sale silently is unacceptable: a full local disk must
//! surface synchronously at enqueue time, at the UI action that caused it,
//! not hours later during a sync run. The conversion from `sqlx::Error`
//! therefore inspects the SQLite result code and splits quota failures out
//! of the generic query error.

use thiserror::Error;

/// Result type alias for local store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Local store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to open or connect to the database file.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Durable storage is full. Surfaced synchronously at enqueue time.
    #[error("Local storage quota exceeded")]
    QuotaExceeded,

    /// A query failed for a reason other than quota.
    #[error("Database error: {0}")]
    Query(String),

    /// A stored payload no longer deserializes into a typed operation.
    #[error("Corrupt queue payload for entry {id}: {reason}")]
    CorruptPayload { id: i64, reason: String },

    /// Row lookup found nothing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// No account is active on this device yet.
    #[error("No active account configured")]
    NoActiveAccount,
}

impl DbError {
    /// Helper for not-found errors.
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }
}

// SQLITE_FULL primary result code.
const SQLITE_FULL: &str = "13";

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let code_is_full = db_err.code().is_some_and(|c| c == SQLITE_FULL);
            if code_is_full || db_err.message().contains("disk is full") {
                return DbError::QuotaExceeded;
            }
        }
        DbError::Query(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = DbError::not_found("Product", "abc-123");
        assert_eq!(err.to_string(), "Product not found: abc-123");
    }

    #[test]
    fn test_quota_message() {
        assert_eq!(
            DbError::QuotaExceeded.to_string(),
            "Local storage quota exceeded"
        );
    }
}
