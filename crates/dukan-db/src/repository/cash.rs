//! # Cash Mirror Repository
//!
//! Read-side cache of manual cash-in / cash-out movements recorded on this
//! device.

use sqlx::SqlitePool;

use crate::error::DbResult;
use dukan_core::CashMirror;

/// Repository for the local cash mirror.
#[derive(Debug, Clone)]
pub struct CashMirrorRepository {
    pool: SqlitePool,
}

impl CashMirrorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashMirrorRepository { pool }
    }

    /// Inserts an optimistic cash movement row.
    pub async fn insert_local(&self, entry: &CashMirror) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cash_mirror (
                id, account_id, server_id, direction, amount_cents,
                reason, sync_status, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.account_id)
        .bind(&entry.server_id)
        .bind(entry.direction)
        .bind(entry.amount_cents)
        .bind(&entry.reason)
        .bind(entry.sync_status)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists recent movements, newest first.
    pub async fn list_recent(&self, account_id: &str, limit: i64) -> DbResult<Vec<CashMirror>> {
        let rows: Vec<CashMirror> = sqlx::query_as(
            r#"
            SELECT id, account_id, server_id, direction, amount_cents,
                   reason, sync_status, recorded_at
            FROM cash_mirror
            WHERE account_id = ?1
            ORDER BY recorded_at DESC
            LIMIT ?2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Reconciles a row after the ledger echoed a canonical id.
    pub async fn mark_synced(
        &self,
        account_id: &str,
        client_ref: &str,
        server_id: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE cash_mirror SET server_id = ?3, sync_status = 'synced'
            WHERE account_id = ?1 AND id = ?2
            "#,
        )
        .bind(account_id)
        .bind(client_ref)
        .bind(server_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes every row belonging to an account (account switch).
    pub async fn clear_account(&self, account_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cash_mirror WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
