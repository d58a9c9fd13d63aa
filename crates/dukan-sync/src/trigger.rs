//! # Sync Trigger
//!
//! One logical trigger with four independent sources, all converging on the
//! engine's single re-entrant "request run" call:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Trigger Sources                                  │
//! │                                                                         │
//! │  (a) offline → online transition      watch::Receiver<bool>            │
//! │  (b) fixed interval while online      tokio::time::interval            │
//! │  (c) foreground visibility regained   SyncTriggerHandle::notify_visible│
//! │  (d) background-worker signal         SyncTriggerHandle::notify_worker │
//! │                                                                         │
//! │          all four ──► SyncEngineHandle::request_run(source)            │
//! │                                                                         │
//! │  The engine is single-flight: triggers that fire during a run are      │
//! │  dropped, not queued. The next periodic tick catches new work.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::engine::SyncEngineHandle;
use crate::events::TriggerSource;

/// Handle for feeding visibility / worker signals into a running trigger.
#[derive(Clone)]
pub struct SyncTriggerHandle {
    signal_tx: mpsc::Sender<TriggerSource>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncTriggerHandle {
    /// The application regained foreground visibility.
    pub fn notify_visible(&self) {
        let _ = self.signal_tx.try_send(TriggerSource::Visibility);
    }

    /// A background worker asked for a sync (push notification, fetch).
    pub fn notify_worker(&self) {
        let _ = self.signal_tx.try_send(TriggerSource::Worker);
    }

    /// Explicit user-initiated sync (also lifts an auth pause).
    pub fn notify_manual(&self) {
        let _ = self.signal_tx.try_send(TriggerSource::Manual);
    }

    /// Stops the trigger loop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Drives the engine from connectivity changes, a wall-clock interval, and
/// external signals.
pub struct SyncTrigger {
    engine: SyncEngineHandle,
    online_rx: watch::Receiver<bool>,
    interval: Duration,
    signal_rx: mpsc::Receiver<TriggerSource>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SyncTrigger {
    /// Creates a trigger and its signal handle.
    pub fn new(
        engine: SyncEngineHandle,
        online_rx: watch::Receiver<bool>,
        interval: Duration,
    ) -> (Self, SyncTriggerHandle) {
        let (signal_tx, signal_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let trigger = SyncTrigger {
            engine,
            online_rx,
            interval,
            signal_rx,
            shutdown_rx,
        };

        let handle = SyncTriggerHandle {
            signal_tx,
            shutdown_tx,
        };

        (trigger, handle)
    }

    /// Runs the trigger loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(interval = ?self.interval, "Sync trigger starting");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // (b) Periodic tick, only meaningful while online.
                _ = ticker.tick() => {
                    if *self.online_rx.borrow() {
                        self.engine.request_run(TriggerSource::Interval);
                    } else {
                        debug!("Offline, skipping interval trigger");
                    }
                }

                // (a) Connectivity transitions. Only the offline → online
                // edge fires a run; the engine no-ops while offline anyway.
                changed = self.online_rx.changed() => {
                    match changed {
                        Ok(()) => {
                            if *self.online_rx.borrow() {
                                info!("Connectivity restored, requesting sync");
                                self.engine.request_run(TriggerSource::Reconnect);
                            }
                        }
                        Err(_) => break, // connectivity feed gone
                    }
                }

                // (c)/(d) External signals.
                Some(source) = self.signal_rx.recv() => {
                    self.engine.request_run(source);
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync trigger shutting down");
                    break;
                }
            }
        }

        info!("Sync trigger stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BatchApi;
    use crate::engine::{EngineSettings, SyncEngine};
    use crate::error::SyncResult;
    use dukan_core::wire::{
        BatchResponse, CashBatchRequest, DueCustomerBatchRequest, DuePaymentBatchRequest,
        ExpenseBatchRequest, ProductBatchRequest, SaleBatchRequest,
    };
    use dukan_db::Database;

    struct IdleApi;

    impl BatchApi for IdleApi {
        async fn commit_products(&self, _req: ProductBatchRequest) -> SyncResult<BatchResponse> {
            Ok(BatchResponse::default())
        }
        async fn commit_sales(&self, _req: SaleBatchRequest) -> SyncResult<BatchResponse> {
            Ok(BatchResponse::default())
        }
        async fn commit_expenses(&self, _req: ExpenseBatchRequest) -> SyncResult<BatchResponse> {
            Ok(BatchResponse::default())
        }
        async fn commit_cash(&self, _req: CashBatchRequest) -> SyncResult<BatchResponse> {
            Ok(BatchResponse::default())
        }
        async fn commit_due_customers(
            &self,
            _req: DueCustomerBatchRequest,
        ) -> SyncResult<BatchResponse> {
            Ok(BatchResponse::default())
        }
        async fn commit_due_payments(
            &self,
            _req: DuePaymentBatchRequest,
        ) -> SyncResult<BatchResponse> {
            Ok(BatchResponse::default())
        }
        async fn check_session(&self) -> SyncResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reconnect_edge_requests_run() {
        let db = Database::in_memory().await.unwrap();
        let (online_tx, online_rx) = watch::channel(false);

        let (engine, engine_handle) =
            SyncEngine::new(IdleApi, db, EngineSettings::default(), online_rx.clone());
        let engine_join = tokio::spawn(engine.run());

        let (trigger, trigger_handle) = SyncTrigger::new(
            engine_handle.clone(),
            online_rx,
            Duration::from_secs(3600), // keep the interval out of the way
        );
        let trigger_join = tokio::spawn(trigger.run());

        // Flip offline → online; the trigger should request a run, which
        // the idle engine completes immediately (empty queue, no account).
        online_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!engine_handle.is_running());

        trigger_handle.shutdown().await;
        engine_handle.shutdown().await;
        trigger_join.await.unwrap();
        engine_join.await.unwrap();
    }

    #[tokio::test]
    async fn test_external_signals_forwarded() {
        let db = Database::in_memory().await.unwrap();
        let (_online_tx, online_rx) = watch::channel(true);

        let (engine, engine_handle) =
            SyncEngine::new(IdleApi, db, EngineSettings::default(), online_rx.clone());
        let engine_join = tokio::spawn(engine.run());

        let (trigger, trigger_handle) =
            SyncTrigger::new(engine_handle.clone(), online_rx, Duration::from_secs(3600));
        let trigger_join = tokio::spawn(trigger.run());

        trigger_handle.notify_visible();
        trigger_handle.notify_worker();
        trigger_handle.notify_manual();
        tokio::time::sleep(Duration::from_millis(50)).await;

        trigger_handle.shutdown().await;
        engine_handle.shutdown().await;
        trigger_join.await.unwrap();
        engine_join.await.unwrap();
    }
}
