//! # Operation Queue Repository
//!
//! The durable queue of not-yet-confirmed business actions.
//!
//! ## The Queue Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     sync_queue Table                                    │
//! │                                                                         │
//! │  id | op_type | natural_key | payload | state   | retry_count          │
//! │  ───┼─────────┼─────────────┼─────────┼─────────┼────────────          │
//! │  1  │ sale    │ ref-a1      │ {...}   │ pending │ 0                    │
//! │  2  │ sale    │ ref-b2      │ {...}   │ pending │ 1                    │
//! │  3  │ expense │ ref-c3      │ {...}   │ dead    │ 5                    │
//! │                                                                         │
//! │  • append() at UI-action time, in the same pool the mirrors use        │
//! │  • list_pending() in FIFO order for each sync run                      │
//! │  • remove() only after the ledger confirms the matching batch          │
//! │  • increment_retry() on failure; mark_dead() past the ceiling          │
//! │  • revive() is the only way back from dead                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are immutable once queued: sync outcomes touch only `state`,
//! `retry_count` and `last_error`, never the payload.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use dukan_core::{OpAction, OpType, OperationPayload, QueueOperation, QueueState};

/// Raw row shape; payload decodes into the typed union on the way out.
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: i64,
    account_id: String,
    op_type: OpType,
    action: OpAction,
    natural_key: String,
    payload: String,
    state: QueueState,
    retry_count: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl QueueRow {
    fn into_operation(self) -> DbResult<QueueOperation> {
        let payload: OperationPayload =
            serde_json::from_str(&self.payload).map_err(|e| DbError::CorruptPayload {
                id: self.id,
                reason: e.to_string(),
            })?;

        Ok(QueueOperation {
            id: self.id,
            account_id: self.account_id,
            op_type: self.op_type,
            action: self.action,
            natural_key: self.natural_key,
            payload,
            state: self.state,
            retry_count: self.retry_count,
            last_error: self.last_error,
            created_at: self.created_at,
        })
    }
}

/// Repository for operation queue access.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueueRepository { pool }
    }

    /// Appends a validated operation with a fresh local id.
    ///
    /// The caller (the queue manager) has already validated the payload.
    /// Storage failures propagate: a quota error must reach the UI action
    /// that triggered the enqueue, never be swallowed.
    pub async fn append(
        &self,
        account_id: &str,
        payload: &OperationPayload,
    ) -> DbResult<QueueOperation> {
        let op_type = payload.op_type();
        let action = payload.action();
        let natural_key = payload.natural_key().to_string();
        let payload_json =
            serde_json::to_string(payload).map_err(|e| DbError::Query(e.to_string()))?;
        let now = Utc::now();

        debug!(%op_type, natural_key = %natural_key, "Appending queue operation");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sync_queue (
                account_id, op_type, action, natural_key, payload,
                state, retry_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6)
            RETURNING id
            "#,
        )
        .bind(account_id)
        .bind(op_type)
        .bind(action)
        .bind(&natural_key)
        .bind(&payload_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueOperation {
            id,
            account_id: account_id.to_string(),
            op_type,
            action,
            natural_key,
            payload: payload.clone(),
            state: QueueState::Pending,
            retry_count: 0,
            last_error: None,
            created_at: now,
        })
    }

    /// Returns all pending operations for an account, oldest first.
    ///
    /// FIFO per `created_at` with the local id as tiebreaker, which is also
    /// insertion order. Dead entries are excluded: they wait for revive.
    pub async fn list_pending(&self, account_id: &str) -> DbResult<Vec<QueueOperation>> {
        let rows: Vec<QueueRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, op_type, action, natural_key, payload,
                   state, retry_count, last_error, created_at
            FROM sync_queue
            WHERE account_id = ?1 AND state = 'pending'
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueRow::into_operation).collect()
    }

    /// Returns dead-lettered operations for an account.
    pub async fn list_dead(&self, account_id: &str) -> DbResult<Vec<QueueOperation>> {
        let rows: Vec<QueueRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, op_type, action, natural_key, payload,
                   state, retry_count, last_error, created_at
            FROM sync_queue
            WHERE account_id = ?1 AND state = 'dead'
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueRow::into_operation).collect()
    }

    /// Removes an operation after the ledger confirmed its batch.
    ///
    /// Idempotent: removing a non-existent id is a no-op, which makes a
    /// double-invocation after an ambiguous ack safe.
    pub async fn remove(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Records a failed attempt. Idempotent on missing ids.
    pub async fn increment_retry(&self, id: i64, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_queue SET
                retry_count = retry_count + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Moves an entry to the dead state, excluding it from automatic retry.
    pub async fn mark_dead(&self, id: i64, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_queue SET
                state = 'dead',
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Moves pending entries past the retry ceiling to dead.
    ///
    /// Returns the number of entries dead-lettered.
    pub async fn dead_letter_exhausted(&self, account_id: &str, ceiling: i64) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET state = 'dead'
            WHERE account_id = ?1 AND state = 'pending' AND retry_count >= ?2
            "#,
        )
        .bind(account_id)
        .bind(ceiling)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// User-initiated revive: resets the retry budget and requeues.
    ///
    /// The only exit from `dead`.
    pub async fn revive(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET
                state = 'pending',
                retry_count = 0,
                last_error = NULL
            WHERE id = ?1 AND state = 'dead'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Dead queue entry", id.to_string()));
        }

        Ok(())
    }

    /// Collapses a queued create when its entity was deleted locally before
    /// ever syncing. Returns the number of entries removed (0 or 1).
    pub async fn remove_by_natural_key(
        &self,
        account_id: &str,
        op_type: OpType,
        natural_key: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM sync_queue
            WHERE account_id = ?1 AND op_type = ?2 AND natural_key = ?3
              AND action = 'create'
            "#,
        )
        .bind(account_id)
        .bind(op_type)
        .bind(natural_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Counts pending entries.
    pub async fn count_pending(&self, account_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_queue WHERE account_id = ?1 AND state = 'pending'",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts dead entries: the pending-failure indicator the UI shows.
    pub async fn count_dead(&self, account_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_queue WHERE account_id = ?1 AND state = 'dead'",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Deletes every queue row belonging to an account.
    ///
    /// Used by the account switch path: all queue rows are unsynced by
    /// definition, so none may leak into another identity's session.
    pub async fn clear_account(&self, account_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use dukan_core::{CashDirection, CashEntryPayload, ExpensePayload};

    fn cash_payload(cents: i64, r: &str) -> OperationPayload {
        OperationPayload::CashCreate(CashEntryPayload {
            client_ref: r.to_string(),
            direction: CashDirection::CashIn,
            amount_cents: cents,
            reason: None,
            recorded_at: Utc::now(),
        })
    }

    fn expense_payload(r: &str) -> OperationPayload {
        OperationPayload::ExpenseCreate(ExpensePayload {
            client_ref: r.to_string(),
            category: "transport".to_string(),
            description: None,
            amount_cents: 400,
            recorded_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_append_and_fifo_order() {
        let db = Database::in_memory().await.unwrap();
        let queue = db.queue();

        queue.append("acc", &cash_payload(100, "a")).await.unwrap();
        queue.append("acc", &expense_payload("b")).await.unwrap();
        queue.append("acc", &cash_payload(300, "c")).await.unwrap();

        let pending = queue.list_pending("acc").await.unwrap();
        assert_eq!(pending.len(), 3);
        let keys: Vec<&str> = pending.iter().map(|o| o.natural_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let queue = db.queue();

        let op = queue.append("acc", &cash_payload(100, "a")).await.unwrap();
        queue.remove(op.id).await.unwrap();
        // Second removal of the same id is a no-op, not an error.
        queue.remove(op.id).await.unwrap();
        assert_eq!(queue.count_pending("acc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_and_dead_letter() {
        let db = Database::in_memory().await.unwrap();
        let queue = db.queue();

        let op = queue.append("acc", &cash_payload(100, "a")).await.unwrap();
        for _ in 0..5 {
            queue.increment_retry(op.id, "timeout").await.unwrap();
        }

        let moved = queue.dead_letter_exhausted("acc", 5).await.unwrap();
        assert_eq!(moved, 1);
        assert_eq!(queue.count_pending("acc").await.unwrap(), 0);
        assert_eq!(queue.count_dead("acc").await.unwrap(), 1);

        let dead = queue.list_dead("acc").await.unwrap();
        assert_eq!(dead[0].last_error.as_deref(), Some("timeout"));

        queue.revive(op.id).await.unwrap();
        let pending = queue.list_pending("acc").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_revive_requires_dead_state() {
        let db = Database::in_memory().await.unwrap();
        let queue = db.queue();

        let op = queue.append("acc", &cash_payload(100, "a")).await.unwrap();
        assert!(queue.revive(op.id).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_by_natural_key_collapses_create() {
        let db = Database::in_memory().await.unwrap();
        let queue = db.queue();

        queue.append("acc", &cash_payload(100, "keep")).await.unwrap();
        queue.append("acc", &cash_payload(200, "gone")).await.unwrap();

        let removed = queue
            .remove_by_natural_key("acc", OpType::Cash, "gone")
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let pending = queue.list_pending("acc").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].natural_key, "keep");
    }

    #[tokio::test]
    async fn test_account_scoping() {
        let db = Database::in_memory().await.unwrap();
        let queue = db.queue();

        queue.append("acc-a", &cash_payload(100, "a")).await.unwrap();
        queue.append("acc-b", &cash_payload(200, "b")).await.unwrap();

        assert_eq!(queue.list_pending("acc-a").await.unwrap().len(), 1);
        assert_eq!(queue.list_pending("acc-b").await.unwrap().len(), 1);

        queue.clear_account("acc-a").await.unwrap();
        assert_eq!(queue.count_pending("acc-a").await.unwrap(), 0);
        assert_eq!(queue.count_pending("acc-b").await.unwrap(), 1);
    }
}
