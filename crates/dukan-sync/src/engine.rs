//! # Sync Engine
//!
//! The orchestrator: drains the queue exactly once per run, grouped by
//! entity family, and reconciles results.
//!
//! ## Run Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        One Sync Run                                     │
//! │                                                                         │
//! │  trigger ──► offline? ──► paused? ──► list_pending (FIFO)              │
//! │                │ yes        │ yes          │                            │
//! │                ▼            ▼              ▼                            │
//! │              no-op        no-op      partition by family               │
//! │                                            │                            │
//! │              ┌─────────────────────────────┼─────────────┐              │
//! │              ▼                             ▼             ▼              │
//! │        products batch                sales batch    cash batch  ...    │
//! │              │                             │             │              │
//! │        POST /v1/sync/products        POST .../sales   POST .../cash    │
//! │              │                             │             │              │
//! │   success: delete contributing entries, reconcile mirrors              │
//! │   failure: retry_count += 1 (transient) or dead (rejected)             │
//! │   401/403: pause the WHOLE engine for a cooldown window                │
//! │                                                                         │
//! │  Each family is independent: one failing batch never blocks the rest.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Single-Flight
//! At most one run executes at a time per device. Concurrent trigger
//! firings are dropped, not queued: the next periodic trigger naturally
//! catches any newly queued work. Engine state is owned by the engine
//! instance, so multiple engines (e.g. under test) never interfere.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::api::BatchApi;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEvent, TriggerSource};
use dukan_core::wire::{
    BatchResponse, CashBatchRequest, DueCustomerBatchRequest, DuePaymentBatchRequest,
    ExpenseBatchRequest, ProductBatchRequest, SaleBatchRequest,
};
use dukan_core::{OpType, OperationPayload, QueueOperation};
use dukan_db::Database;

// =============================================================================
// Settings & Status
// =============================================================================

/// Engine knobs, extracted from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum queue entries submitted per family per run.
    pub batch_size: usize,

    /// Failed attempts before an entry is dead-lettered.
    pub retry_ceiling: i64,

    /// Engine-wide cooldown after an authentication rejection.
    pub auth_pause: std::time::Duration,
}

impl From<&SyncConfig> for EngineSettings {
    fn from(config: &SyncConfig) -> Self {
        EngineSettings {
            batch_size: config.sync.batch_size,
            retry_ceiling: config.sync.retry_ceiling,
            auth_pause: config.auth_pause(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::from(&SyncConfig::default())
    }
}

/// Current sync status for external queries (UI indicators).
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Number of pending queue entries.
    pub pending_count: i64,

    /// Number of dead-lettered entries awaiting manual attention.
    pub dead_count: i64,

    /// Last successful run.
    pub last_sync: Option<DateTime<Utc>>,

    /// Last error message (if any).
    pub last_error: Option<String>,

    /// Set while the engine is paused after auth failures.
    pub paused_until: Option<DateTime<Utc>>,
}

/// What a single run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Queue entries confirmed and removed.
    pub committed: usize,

    /// Queue entries that failed this run (retried or dead-lettered).
    pub failed: usize,
}

/// Why a run did or did not proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run executed.
    Completed(RunSummary),

    /// Device offline; nothing attempted.
    Offline,

    /// Engine paused after auth failures; nothing attempted.
    Paused,

    /// No account signed in on this device.
    NoAccount,
}

// =============================================================================
// Engine Handle
// =============================================================================

/// Handle for driving a running [`SyncEngine`] from triggers, the UI, and
/// tests.
#[derive(Clone)]
pub struct SyncEngineHandle {
    run_tx: mpsc::Sender<TriggerSource>,
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<SyncStatus>>,
    events: broadcast::Sender<SyncEvent>,
    running: Arc<AtomicBool>,
}

impl SyncEngineHandle {
    /// Requests a sync run. Returns false when the request was dropped
    /// because a run is already in progress (single-flight) or one is
    /// already scheduled.
    pub fn request_run(&self, source: TriggerSource) -> bool {
        if self.running.load(Ordering::SeqCst) {
            debug!(?source, "Run already in progress, dropping trigger");
            return false;
        }
        self.run_tx.try_send(source).is_ok()
    }

    /// True while a run is executing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns the current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Signals the engine to shut down gracefully.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// The sync engine. Owns all mutable run state: the single-flight guard,
/// the pause window: rather than keeping it in ambient globals.
pub struct SyncEngine<A> {
    api: A,
    db: Database,
    settings: EngineSettings,
    online_rx: watch::Receiver<bool>,
    status: Arc<RwLock<SyncStatus>>,
    events: broadcast::Sender<SyncEvent>,
    running: Arc<AtomicBool>,
    paused_until: Option<DateTime<Utc>>,
    run_rx: mpsc::Receiver<TriggerSource>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<A: BatchApi> SyncEngine<A> {
    /// Creates an engine and its control handle.
    ///
    /// `online_rx` feeds connectivity transitions from the trigger layer.
    pub fn new(
        api: A,
        db: Database,
        settings: EngineSettings,
        online_rx: watch::Receiver<bool>,
    ) -> (Self, SyncEngineHandle) {
        // Capacity 1: at most one scheduled run; extra triggers drop.
        let (run_tx, run_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (events, _) = broadcast::channel(64);
        let status = Arc::new(RwLock::new(SyncStatus::default()));
        let running = Arc::new(AtomicBool::new(false));

        let handle = SyncEngineHandle {
            run_tx,
            shutdown_tx,
            status: status.clone(),
            events: events.clone(),
            running: running.clone(),
        };

        let engine = SyncEngine {
            api,
            db,
            settings,
            online_rx,
            status,
            events,
            running,
            paused_until: None,
            run_rx,
            shutdown_rx,
        };

        (engine, handle)
    }

    /// Runs the engine loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!("Sync engine starting");

        loop {
            tokio::select! {
                Some(source) = self.run_rx.recv() => {
                    self.running.store(true, Ordering::SeqCst);
                    match self.run_once(source).await {
                        Ok(outcome) => debug!(?outcome, "Sync run finished"),
                        Err(e) => error!(?e, "Sync run failed"),
                    }
                    self.running.store(false, Ordering::SeqCst);
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync engine shutting down");
                    break;
                }

                else => break,
            }
        }

        info!("Sync engine stopped");
    }

    /// Executes one drain. Public so tests can drive the engine directly
    /// without spawning the loop.
    pub async fn run_once(&mut self, source: TriggerSource) -> SyncResult<RunOutcome> {
        // 1. Offline: no-op.
        if !*self.online_rx.borrow() {
            debug!("Device offline, skipping sync run");
            return Ok(RunOutcome::Offline);
        }

        // 2. Pause gate. The pause lifts via a successful session check
        //    once the window elapses, or immediately on a Manual trigger.
        if let Some(until) = self.paused_until {
            let probe = source == TriggerSource::Manual || Utc::now() >= until;
            if !probe {
                debug!(%until, "Engine paused, dropping trigger");
                return Ok(RunOutcome::Paused);
            }

            match self.api.check_session().await {
                Ok(()) => {
                    info!("Session check succeeded, lifting pause");
                    self.paused_until = None;
                    self.set_paused(None).await;
                    self.emit(SyncEvent::Resumed);
                }
                Err(e) if e.is_auth_failure() => {
                    let until = self.pause().await;
                    warn!(%until, "Session still rejected, extending pause");
                    return Ok(RunOutcome::Paused);
                }
                Err(e) => {
                    debug!(?e, "Session check failed transiently, staying paused");
                    return Ok(RunOutcome::Paused);
                }
            }
        }

        // 3. Resolve the account the queue is scoped to.
        let Some(account) = self.db.accounts().active().await? else {
            debug!("No active account, skipping sync run");
            return Ok(RunOutcome::NoAccount);
        };

        // 4. Read all pending operations in FIFO order.
        let ops = self.db.queue().list_pending(&account).await?;
        if ops.is_empty() {
            self.refresh_counts(&account).await?;
            return Ok(RunOutcome::Completed(RunSummary::default()));
        }

        info!(count = ops.len(), ?source, "Starting sync run");
        self.emit(SyncEvent::Started { source });

        // 5. Partition into per-family batches.
        let mut partition = Partition::build(ops, self.settings.batch_size);

        // 6. Submit each non-empty batch independently.
        let mut summary = RunSummary::default();
        for family in OpType::SUBMIT_ORDER {
            match self.submit_family(&account, family, &mut partition).await {
                Ok(None) => {}
                Ok(Some((committed, failed))) => {
                    summary.committed += committed;
                    summary.failed += failed;
                    self.emit(SyncEvent::BatchCommitted { family, committed });
                }
                Err(e) if e.is_auth_failure() => {
                    // Auth affects every family; stop the run and pause.
                    let until = self.pause().await;
                    warn!(%until, "Authentication rejected, pausing engine");
                    self.refresh_counts(&account).await?;
                    return Ok(RunOutcome::Paused);
                }
                Err(e) => {
                    // Batch-level failure. Other families still submit.
                    let failed = self
                        .fail_family(&account, family, &partition, &e)
                        .await?;
                    summary.failed += failed;
                    self.emit(SyncEvent::BatchFailed {
                        family,
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }

        // 7. Entries past the retry ceiling stop retrying but stay visible.
        let dead_lettered = self
            .db
            .queue()
            .dead_letter_exhausted(&account, self.settings.retry_ceiling)
            .await?;
        if dead_lettered > 0 {
            warn!(count = dead_lettered, "Entries moved to dead-letter state");
        }

        // 8. Refresh indicators and finish.
        let (pending, dead) = self.refresh_counts(&account).await?;
        {
            let mut s = self.status.write().await;
            s.last_sync = Some(Utc::now());
            if summary.failed == 0 {
                s.last_error = None;
            }
        }

        self.emit(SyncEvent::Finished {
            committed: summary.committed,
            failed: summary.failed,
            pending,
            dead,
        });

        info!(
            committed = summary.committed,
            failed = summary.failed,
            pending,
            "Sync run complete"
        );

        Ok(RunOutcome::Completed(summary))
    }

    /// Submits one family's batch. Returns `None` when the family is empty.
    async fn submit_family(
        &self,
        account: &str,
        family: OpType,
        partition: &mut Partition,
    ) -> SyncResult<Option<(usize, usize)>> {
        let response = match family {
            OpType::Product => {
                if partition.products.is_empty() {
                    return Ok(None);
                }
                self.api.commit_products(partition.products.clone()).await?
            }
            OpType::Sale => {
                if partition.sales.new_items.is_empty() {
                    return Ok(None);
                }
                self.api.commit_sales(partition.sales.clone()).await?
            }
            OpType::Expense => {
                if partition.expenses.new_items.is_empty() {
                    return Ok(None);
                }
                self.api.commit_expenses(partition.expenses.clone()).await?
            }
            OpType::Cash => {
                if partition.cash.new_items.is_empty() {
                    return Ok(None);
                }
                self.api.commit_cash(partition.cash.clone()).await?
            }
            OpType::DueCustomer => {
                if partition.due_customers.new_items.is_empty() {
                    return Ok(None);
                }
                self.api
                    .commit_due_customers(partition.due_customers.clone())
                    .await?
            }
            OpType::DuePayment => {
                if partition.due_payments.new_items.is_empty() {
                    return Ok(None);
                }
                self.api
                    .commit_due_payments(partition.due_payments.clone())
                    .await?
            }
        };

        let outcome = self
            .apply_response(account, family, partition, response)
            .await?;
        Ok(Some(outcome))
    }

    /// Applies per-item outcomes: removes confirmed entries, reconciles
    /// mirrors, retries or dead-letters rejected items.
    async fn apply_response(
        &self,
        account: &str,
        family: OpType,
        partition: &mut Partition,
        response: BatchResponse,
    ) -> SyncResult<(usize, usize)> {
        let refs = partition.refs_mut(family);
        let mut confirmed: Vec<(i64, String, String, Option<i64>)> = Vec::new();
        let mut rejected: Vec<(i64, String, bool)> = Vec::new();

        for id in &response.ids {
            if let Some(op_id) = refs.remove(&id.client_ref) {
                confirmed.push((
                    op_id,
                    id.client_ref.clone(),
                    id.server_id.clone(),
                    id.invoice_no,
                ));
            }
        }
        for err in &response.errors {
            if let Some(op_id) = refs.remove(&err.client_ref) {
                rejected.push((
                    op_id,
                    format!("{}: {}", err.code, err.message),
                    err.retryable,
                ));
            }
        }
        // Entries the server mentioned in neither list stay queued and are
        // retried by the next run.

        let committed = confirmed.len();
        let failed = rejected.len();
        let queue = self.db.queue();

        for (op_id, client_ref, server_id, invoice_no) in confirmed {
            queue.remove(op_id).await?;

            match family {
                OpType::Product => {
                    if partition.product_deletes.contains(&client_ref) {
                        self.db.products().purge_deleted(account, &client_ref).await?;
                    } else {
                        self.db
                            .products()
                            .mark_synced(account, &client_ref, &server_id)
                            .await?;
                    }
                }
                OpType::Sale => {
                    self.db
                        .sales()
                        .mark_synced(account, &client_ref, &server_id, invoice_no)
                        .await?;
                }
                OpType::Expense => {
                    self.db
                        .expenses()
                        .mark_synced(account, &client_ref, &server_id)
                        .await?;
                }
                OpType::Cash => {
                    self.db
                        .cash()
                        .mark_synced(account, &client_ref, &server_id)
                        .await?;
                }
                // Due customers/payments carry no local mirror.
                OpType::DueCustomer | OpType::DuePayment => {}
            }
        }

        for (op_id, message, retryable) in rejected {
            if retryable {
                queue.increment_retry(op_id, &message).await?;
            } else {
                // Validation failures never retry automatically; they go
                // straight to dead for the clerk to correct.
                warn!(op_id, %message, "Batch item rejected, dead-lettering");
                queue.mark_dead(op_id, &message).await?;
            }
        }

        Ok((committed, failed))
    }

    /// Handles a batch-level failure for every contributing entry.
    async fn fail_family(
        &self,
        _account: &str,
        family: OpType,
        partition: &Partition,
        err: &SyncError,
    ) -> SyncResult<usize> {
        let refs = partition.refs(family);
        if refs.is_empty() {
            return Ok(0);
        }

        let message = err.to_string();
        let retryable = err.is_retryable();
        let queue = self.db.queue();

        if matches!(err, SyncError::ServerFault { .. }) {
            // 5xx is retried like any transient failure but logged
            // distinctly for operational visibility.
            warn!(family = %family, server_fault = true, %message, "Batch hit server fault");
        } else {
            warn!(family = %family, retryable, %message, "Batch failed");
        }

        for &op_id in refs.values() {
            if retryable {
                queue.increment_retry(op_id, &message).await?;
            } else {
                queue.mark_dead(op_id, &message).await?;
            }
        }

        {
            let mut s = self.status.write().await;
            s.last_error = Some(message);
        }

        Ok(refs.len())
    }

    /// Enters the pause state and returns the pause deadline.
    async fn pause(&mut self) -> DateTime<Utc> {
        let until = Utc::now() + chrono::Duration::seconds(self.settings.auth_pause.as_secs() as i64);
        self.paused_until = Some(until);
        self.set_paused(Some(until)).await;
        self.emit(SyncEvent::Paused { until });
        until
    }

    async fn set_paused(&self, until: Option<DateTime<Utc>>) {
        let mut s = self.status.write().await;
        s.paused_until = until;
    }

    async fn refresh_counts(&self, account: &str) -> SyncResult<(i64, i64)> {
        let pending = self.db.queue().count_pending(account).await?;
        let dead = self.db.queue().count_dead(account).await?;

        let mut s = self.status.write().await;
        s.pending_count = pending;
        s.dead_count = dead;

        Ok((pending, dead))
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine; events are best-effort.
        let _ = self.events.send(event);
    }
}

// =============================================================================
// Partitioning
// =============================================================================

/// Per-family batches plus the `client_ref → queue id` maps needed to
/// reconcile responses back onto queue entries.
#[derive(Default)]
struct Partition {
    products: ProductBatchRequest,
    product_refs: HashMap<String, i64>,
    product_deletes: HashSet<String>,

    sales: SaleBatchRequest,
    sale_refs: HashMap<String, i64>,

    expenses: ExpenseBatchRequest,
    expense_refs: HashMap<String, i64>,

    cash: CashBatchRequest,
    cash_refs: HashMap<String, i64>,

    due_customers: DueCustomerBatchRequest,
    due_customer_refs: HashMap<String, i64>,

    due_payments: DuePaymentBatchRequest,
    due_payment_refs: HashMap<String, i64>,
}

impl Partition {
    /// Splits pending operations into family batches, keeping FIFO order
    /// within each family and honoring the per-family size cap. Entries
    /// beyond the cap stay queued for the next run.
    fn build(ops: Vec<QueueOperation>, batch_size: usize) -> Self {
        let mut p = Partition::default();

        for op in ops {
            let refs = p.refs_mut(op.op_type);
            if refs.len() >= batch_size {
                continue;
            }
            refs.insert(op.natural_key.clone(), op.id);

            match op.payload {
                OperationPayload::ProductCreate(payload) => p.products.new_items.push(payload),
                OperationPayload::ProductUpdate(payload) => p.products.updated_items.push(payload),
                OperationPayload::ProductDelete(payload) => {
                    p.product_deletes.insert(payload.product_id.clone());
                    p.products.deleted_ids.push(payload.product_id);
                }
                OperationPayload::SaleCreate(payload) => p.sales.new_items.push(payload),
                OperationPayload::ExpenseCreate(payload) => p.expenses.new_items.push(payload),
                OperationPayload::CashCreate(payload) => p.cash.new_items.push(payload),
                OperationPayload::DueCustomerCreate(payload) => {
                    p.due_customers.new_items.push(payload)
                }
                OperationPayload::DuePaymentCreate(payload) => {
                    p.due_payments.new_items.push(payload)
                }
            }
        }

        p
    }

    fn refs(&self, family: OpType) -> &HashMap<String, i64> {
        match family {
            OpType::Product => &self.product_refs,
            OpType::Sale => &self.sale_refs,
            OpType::Expense => &self.expense_refs,
            OpType::Cash => &self.cash_refs,
            OpType::DueCustomer => &self.due_customer_refs,
            OpType::DuePayment => &self.due_payment_refs,
        }
    }

    fn refs_mut(&mut self, family: OpType) -> &mut HashMap<String, i64> {
        match family {
            OpType::Product => &mut self.product_refs,
            OpType::Sale => &mut self.sale_refs,
            OpType::Expense => &mut self.expense_refs,
            OpType::Cash => &mut self.cash_refs,
            OpType::DueCustomer => &mut self.due_customer_refs,
            OpType::DuePayment => &mut self.due_payment_refs,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
