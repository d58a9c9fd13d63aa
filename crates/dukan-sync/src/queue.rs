//! # Queue Manager
//!
//! The UI-facing surface of the Local Operation Store: typed enqueue with
//! validation at the point of creation, FIFO listing, idempotent removal,
//! the create+delete collapse, and the dead-letter surface.
//!
//! ## Enqueue Path
//! ```text
//! UI action ──► payload.validate() ──► append(account, payload)
//!                    │ err                     │ quota err
//!                    ▼                         ▼
//!            surfaced synchronously    surfaced synchronously
//!            (nothing queued)          (clerk must know a sale
//!                                       was NOT recorded)
//! ```

use tracing::debug;

use crate::error::{SyncError, SyncResult};
use dukan_core::{OpType, OperationPayload, QueueOperation};
use dukan_db::Database;

/// Typed, validated access to the durable operation queue.
///
/// All reads and writes are scoped to the device's active account.
#[derive(Debug, Clone)]
pub struct QueueManager {
    db: Database,
}

impl QueueManager {
    /// Creates a new queue manager over the local store.
    pub fn new(db: Database) -> Self {
        QueueManager { db }
    }

    /// Resolves the active account, erroring when none is signed in.
    async fn account(&self) -> SyncResult<String> {
        self.db
            .accounts()
            .active()
            .await?
            .ok_or(SyncError::NoActiveAccount)
    }

    /// Validates and appends an operation.
    ///
    /// Never silently drops: a validation or quota failure propagates to
    /// the UI action that triggered it.
    pub async fn enqueue(&self, payload: OperationPayload) -> SyncResult<QueueOperation> {
        payload.validate()?;

        let account = self.account().await?;
        let op = self.db.queue().append(&account, &payload).await?;

        debug!(id = op.id, op_type = %op.op_type, "Operation enqueued");
        Ok(op)
    }

    /// Returns all pending operations, oldest first (FIFO).
    pub async fn list_pending(&self) -> SyncResult<Vec<QueueOperation>> {
        let account = self.account().await?;
        Ok(self.db.queue().list_pending(&account).await?)
    }

    /// Removes an operation. Idempotent on missing ids.
    pub async fn remove(&self, id: i64) -> SyncResult<()> {
        Ok(self.db.queue().remove(id).await?)
    }

    /// Records a failed attempt. Idempotent on missing ids.
    pub async fn increment_retry(&self, id: i64, error: &str) -> SyncResult<()> {
        Ok(self.db.queue().increment_retry(id, error).await?)
    }

    /// Collapses a queued create whose entity was deleted locally before
    /// ever syncing: a create that never left the device produces no
    /// network traffic at all.
    pub async fn remove_by_natural_key(
        &self,
        op_type: OpType,
        natural_key: &str,
    ) -> SyncResult<u64> {
        let account = self.account().await?;
        Ok(self
            .db
            .queue()
            .remove_by_natural_key(&account, op_type, natural_key)
            .await?)
    }

    /// Deletes a locally-created product. When the row never synced, the
    /// matching queued create is purged too.
    pub async fn discard_product(&self, local_id: &str) -> SyncResult<()> {
        let account = self.account().await?;

        let collapsed = self.db.products().delete_local(&account, local_id).await?;
        if collapsed {
            self.db
                .queue()
                .remove_by_natural_key(&account, OpType::Product, local_id)
                .await?;
            debug!(id = %local_id, "Collapsed unsynced product create+delete");
        } else {
            // Row had synced: queue a delete for the next run.
            let deleted = self.db.products().get(&account, local_id).await?;
            let target = deleted
                .and_then(|p| p.server_id)
                .unwrap_or_else(|| local_id.to_string());
            self.enqueue(OperationPayload::ProductDelete(
                dukan_core::ProductDeletePayload {
                    product_id: target,
                    recorded_at: chrono::Utc::now(),
                },
            ))
            .await?;
        }

        Ok(())
    }

    /// Number of pending operations (UI sync indicator).
    pub async fn pending_count(&self) -> SyncResult<i64> {
        let account = self.account().await?;
        Ok(self.db.queue().count_pending(&account).await?)
    }

    /// Number of dead-lettered operations (UI failure indicator).
    pub async fn dead_count(&self) -> SyncResult<i64> {
        let account = self.account().await?;
        Ok(self.db.queue().count_dead(&account).await?)
    }

    /// Lists dead-lettered operations for manual inspection.
    pub async fn list_dead(&self) -> SyncResult<Vec<QueueOperation>> {
        let account = self.account().await?;
        Ok(self.db.queue().list_dead(&account).await?)
    }

    /// User-initiated revive of a dead entry.
    pub async fn revive(&self, id: i64) -> SyncResult<()> {
        Ok(self.db.queue().revive(id).await?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dukan_core::{
        CashDirection, CashEntryPayload, ProductMirror, ProductPayload, SyncStatus,
    };

    async fn manager() -> QueueManager {
        let db = Database::in_memory().await.unwrap();
        db.accounts().switch("acc").await.unwrap();
        QueueManager::new(db)
    }

    fn product_payload(r: &str) -> OperationPayload {
        OperationPayload::ProductCreate(ProductPayload {
            client_ref: r.to_string(),
            product_id: None,
            name: "Tea 250g".to_string(),
            price_cents: 900,
            cost_cents: Some(700),
            stock_qty: 10,
            track_stock: true,
            is_active: true,
            recorded_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_enqueue_validates_first() {
        let mgr = manager().await;

        let bad = OperationPayload::CashCreate(CashEntryPayload {
            client_ref: "ref-1".to_string(),
            direction: CashDirection::CashIn,
            amount_cents: 0,
            reason: None,
            recorded_at: Utc::now(),
        });

        assert!(matches!(
            mgr.enqueue(bad).await,
            Err(SyncError::Validation(_))
        ));
        assert_eq!(mgr.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_requires_account() {
        let db = Database::in_memory().await.unwrap();
        let mgr = QueueManager::new(db);

        assert!(matches!(
            mgr.enqueue(product_payload("r")).await,
            Err(SyncError::NoActiveAccount)
        ));
    }

    #[tokio::test]
    async fn test_discard_product_collapses_unsynced_create() {
        let db = Database::in_memory().await.unwrap();
        db.accounts().switch("acc").await.unwrap();
        let mgr = QueueManager::new(db.clone());

        // Optimistic mirror row + queued create, as the UI would do.
        db.products()
            .insert_local(&ProductMirror {
                id: "ref-p".to_string(),
                account_id: "acc".to_string(),
                server_id: None,
                name: "Tea 250g".to_string(),
                price_cents: 900,
                stock_qty: 10,
                track_stock: true,
                is_active: true,
                sync_status: SyncStatus::New,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        mgr.enqueue(product_payload("ref-p")).await.unwrap();
        assert_eq!(mgr.pending_count().await.unwrap(), 1);

        // Local delete before any sync run: both sides collapse to nothing.
        mgr.discard_product("ref-p").await.unwrap();
        assert_eq!(mgr.pending_count().await.unwrap(), 0);
        assert!(db.products().get("acc", "ref-p").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_discard_synced_product_queues_delete() {
        let db = Database::in_memory().await.unwrap();
        db.accounts().switch("acc").await.unwrap();
        let mgr = QueueManager::new(db.clone());

        db.products()
            .insert_local(&ProductMirror {
                id: "ref-p".to_string(),
                account_id: "acc".to_string(),
                server_id: None,
                name: "Tea 250g".to_string(),
                price_cents: 900,
                stock_qty: 10,
                track_stock: true,
                is_active: true,
                sync_status: SyncStatus::New,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        db.products()
            .mark_synced("acc", "ref-p", "srv-1")
            .await
            .unwrap();

        mgr.discard_product("ref-p").await.unwrap();

        let pending = mgr.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].natural_key, "srv-1");
        assert_eq!(pending[0].op_type, OpType::Product);
    }
}
