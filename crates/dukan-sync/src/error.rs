//! # Sync Error Types
//!
//! Error types for the sync engine, mapped onto the failure taxonomy the
//! engine acts on.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Local Store   │  │   Transport     │  │     Server              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  QuotaExceeded  │  │  Transport      │  │  AuthRejected           │ │
//! │  │  Storage        │  │  (timeout,      │  │  ServerFault (5xx)      │ │
//! │  │  NoActiveAccount│  │   conn reset)   │  │  Rejected (other 4xx)   │ │
//! │  └─────────────────┘  └─────────────────┘  │  Protocol (bad body)    │ │
//! │                                            └─────────────────────────┘ │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Validation     │  │  Configuration  │                              │
//! │  │  (at enqueue)   │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! How each category is handled:
//! - `Validation` never reaches the queue: surfaced synchronously
//! - `QuotaExceeded` surfaces at enqueue time, never deferred to sync time
//! - `Transport` / `ServerFault` / `Protocol` retry on the next run
//! - `AuthRejected` pauses the whole engine for a cooldown window
//! - `Rejected` (non-auth 4xx) dead-letters without burning retries

use thiserror::Error;

use dukan_core::ValidationError;
use dukan_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Local Store Errors
    // =========================================================================
    /// Durable storage is full. The UI action that enqueued must surface
    /// this to the clerk rather than silently drop the operation.
    #[error("Local storage quota exceeded")]
    QuotaExceeded,

    /// Any other local store failure.
    #[error("Local store error: {0}")]
    Storage(String),

    /// No account is signed in on this device.
    #[error("No active account configured")]
    NoActiveAccount,

    // =========================================================================
    // Enqueue-Time Validation
    // =========================================================================
    /// Payload failed validation; nothing was queued.
    #[error("Invalid operation payload: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Network-level failure: timeout, connection reset, DNS.
    #[error("Network failure: {0}")]
    Transport(String),

    // =========================================================================
    // Server Responses
    // =========================================================================
    /// Session expired or invalid (401/403). Pauses the engine.
    #[error("Authentication rejected (status {status})")]
    AuthRejected { status: u16 },

    /// Unexpected 5xx. Retried like a transient failure, logged distinctly.
    #[error("Server fault (status {status}): {message}")]
    ServerFault { status: u16, message: String },

    /// Non-auth 4xx: the request itself is wrong, retrying cannot help.
    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not decode into the batch contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID (required for sync).
    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::QuotaExceeded => SyncError::QuotaExceeded,
            DbError::NoActiveAccount => SyncError::NoActiveAccount,
            other => SyncError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// True when the operation can be retried on the next run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::ServerFault { .. } | SyncError::Protocol(_)
        )
    }

    /// True when the whole engine must pause rather than retry per item.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SyncError::AuthRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::Transport("reset".into()).is_retryable());
        assert!(SyncError::ServerFault {
            status: 502,
            message: "bad gateway".into()
        }
        .is_retryable());

        assert!(!SyncError::AuthRejected { status: 401 }.is_retryable());
        assert!(!SyncError::Rejected {
            status: 422,
            message: "bad batch".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_auth_classification() {
        assert!(SyncError::AuthRejected { status: 403 }.is_auth_failure());
        assert!(!SyncError::Transport("x".into()).is_auth_failure());
    }

    #[test]
    fn test_db_error_mapping() {
        let err: SyncError = DbError::QuotaExceeded.into();
        assert!(matches!(err, SyncError::QuotaExceeded));
    }
}
