//! # Sale Mirror Repository
//!
//! Read-side cache of sales recorded on this device. A sale mirror row is
//! born `new` at checkout time and becomes `synced` once the ledger echoes
//! back the server id and the shop-scoped invoice number.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use dukan_core::SaleMirror;

/// Repository for the local sale mirror.
#[derive(Debug, Clone)]
pub struct SaleMirrorRepository {
    pool: SqlitePool,
}

impl SaleMirrorRepository {
    /// Creates a new SaleMirrorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleMirrorRepository { pool }
    }

    /// Inserts an optimistic sale row at checkout time.
    pub async fn insert_local(&self, sale: &SaleMirror) -> DbResult<()> {
        debug!(id = %sale.id, total = sale.total_cents, "Inserting sale mirror row");

        sqlx::query(
            r#"
            INSERT INTO sale_mirror (
                id, account_id, server_id, invoice_no, total_cents,
                payment_method, customer_id, sync_status, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.account_id)
        .bind(&sale.server_id)
        .bind(sale.invoice_no)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(&sale.customer_id)
        .bind(sale.sync_status)
        .bind(sale.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a sale row by local id.
    pub async fn get(&self, account_id: &str, id: &str) -> DbResult<Option<SaleMirror>> {
        let row: Option<SaleMirror> = sqlx::query_as(
            r#"
            SELECT id, account_id, server_id, invoice_no, total_cents,
                   payment_method, customer_id, sync_status, recorded_at
            FROM sale_mirror
            WHERE account_id = ?1 AND id = ?2
            "#,
        )
        .bind(account_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Lists recent sales, newest first.
    pub async fn list_recent(&self, account_id: &str, limit: i64) -> DbResult<Vec<SaleMirror>> {
        let rows: Vec<SaleMirror> = sqlx::query_as(
            r#"
            SELECT id, account_id, server_id, invoice_no, total_cents,
                   payment_method, customer_id, sync_status, recorded_at
            FROM sale_mirror
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

    /// Reconciles a sale after commit: canonical id plus invoice number.
    pub async fn mark_synced(
        &self,
        account_id: &str,
        client_ref: &str,
        server_id: &str,
        invoice_no: Option<i64>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sale_mirror SET
                server_id = ?3,
                invoice_no = COALESCE(?4, invoice_no),
                sync_status = 'synced'
            WHERE account_id = ?1 AND id = ?2
            "#,
        )
        .bind(account_id)
        .bind(client_ref)
        .bind(server_id)
        .bind(invoice_no)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes every row belonging to an account (account switch).
    pub async fn clear_account(&self, account_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sale_mirror WHERE account_id = ?1")
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
    use dukan_core::{PaymentMethod, SyncStatus};

    #[tokio::test]
    async fn test_sale_reconciliation_sets_invoice() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.sales();

        repo.insert_local(&SaleMirror {
            id: "ref-1".to_string(),
            account_id: "acc".to_string(),
            server_id: None,
            invoice_no: None,
            total_cents: 1000,
            payment_method: PaymentMethod::Cash,
            customer_id: None,
            sync_status: SyncStatus::New,
            recorded_at: Utc::now(),
        })
        .await
        .unwrap();

        repo.mark_synced("acc", "ref-1", "srv-1", Some(17)).await.unwrap();

        let row = repo.get("acc", "ref-1").await.unwrap().unwrap();
        assert_eq!(row.server_id.as_deref(), Some("srv-1"));
        assert_eq!(row.invoice_no, Some(17));
        assert_eq!(row.sync_status, SyncStatus::Synced);
    }
}
