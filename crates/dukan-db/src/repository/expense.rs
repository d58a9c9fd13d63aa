//! # Expense Mirror Repository
//!
//! Read-side cache of expenses recorded on this device.

use sqlx::SqlitePool;

use crate::error::DbResult;
use dukan_core::ExpenseMirror;

/// Repository for the local expense mirror.
#[derive(Debug, Clone)]
pub struct ExpenseMirrorRepository {
    pool: SqlitePool,
}

impl ExpenseMirrorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseMirrorRepository { pool }
    }

    /// Inserts an optimistic expense row.
    pub async fn insert_local(&self, expense: &ExpenseMirror) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO expense_mirror (
                id, account_id, server_id, category, description,
                amount_cents, sync_status, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.account_id)
        .bind(&expense.server_id)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(expense.sync_status)
        .bind(expense.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists recent expenses, newest first.
    pub async fn list_recent(&self, account_id: &str, limit: i64) -> DbResult<Vec<ExpenseMirror>> {
        let rows: Vec<ExpenseMirror> = sqlx::query_as(
            r#"
            SELECT id, account_id, server_id, category, description,
                   amount_cents, sync_status, recorded_at
            FROM expense_mirror
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
            UPDATE expense_mirror SET server_id = ?3, sync_status = 'synced'
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
        let result = sqlx::query("DELETE FROM expense_mirror WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
