//! # Sync Lifecycle Events
//!
//! Typed events published on a broadcast channel so UI layers and tests can
//! both observe the engine without coupling to a dispatch mechanism.
//! Sync-time failures surface here (plus the pending/dead counters), never
//! as blocking dialogs: the clerk keeps working offline.

use chrono::{DateTime, Utc};

use dukan_core::OpType;

/// Which of the four trigger sources requested a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Device transitioned from offline to online.
    Reconnect,
    /// Fixed wall-clock interval elapsed while online.
    Interval,
    /// Application regained foreground visibility.
    Visibility,
    /// Explicit signal from a background worker.
    Worker,
    /// Explicit user action (also lifts an auth pause).
    Manual,
}

/// Engine lifecycle events.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A run began.
    Started { source: TriggerSource },

    /// One family's batch committed; its queue entries were removed.
    BatchCommitted { family: OpType, committed: usize },

    /// One family's batch failed. Other families still submitted.
    BatchFailed {
        family: OpType,
        message: String,
        retryable: bool,
    },

    /// A run ended. Counters let the UI refresh its pending indicator.
    Finished {
        committed: usize,
        failed: usize,
        pending: i64,
        dead: i64,
    },

    /// Repeated auth failures paused the engine until the given instant.
    Paused { until: DateTime<Utc> },

    /// The pause lifted (successful session check or user action).
    Resumed,
}
