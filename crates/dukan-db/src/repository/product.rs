//! # Product Mirror Repository
//!
//! Read-side cache of products for offline UI rendering.
//!
//! ## Reconciliation
//! A locally-created row starts as `sync_status = 'new'` keyed by its client
//! ref. Once the ledger acknowledges the create, `mark_synced` stores the
//! canonical server id and flips the status: a single UPDATE, no row moves.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use dukan_core::{ProductMirror, SyncStatus};

/// Repository for the local product mirror.
#[derive(Debug, Clone)]
pub struct ProductMirrorRepository {
    pool: SqlitePool,
}

impl ProductMirrorRepository {
    /// Creates a new ProductMirrorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductMirrorRepository { pool }
    }

    /// Inserts an optimistic local row at UI-action time.
    pub async fn insert_local(&self, product: &ProductMirror) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product mirror row");

        sqlx::query(
            r#"
            INSERT INTO product_mirror (
                id, account_id, server_id, name, price_cents,
                stock_qty, track_stock, is_active, sync_status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.account_id)
        .bind(&product.server_id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.stock_qty)
        .bind(product.track_stock)
        .bind(product.is_active)
        .bind(product.sync_status)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a mirror row by its local id.
    pub async fn get(&self, account_id: &str, id: &str) -> DbResult<Option<ProductMirror>> {
        let row: Option<ProductMirror> = sqlx::query_as(
            r#"
            SELECT id, account_id, server_id, name, price_cents,
                   stock_qty, track_stock, is_active, sync_status, updated_at
            FROM product_mirror
            WHERE account_id = ?1 AND id = ?2
            "#,
        )
        .bind(account_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Lists active mirror rows for rendering.
    pub async fn list(&self, account_id: &str) -> DbResult<Vec<ProductMirror>> {
        let rows: Vec<ProductMirror> = sqlx::query_as(
            r#"
            SELECT id, account_id, server_id, name, price_cents,
                   stock_qty, track_stock, is_active, sync_status, updated_at
            FROM product_mirror
            WHERE account_id = ?1 AND sync_status != 'deleted'
            ORDER BY name ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Applies a local edit, marking the row for sync.
    ///
    /// Rows that never synced stay `new`: there is nothing on the server
    /// to update yet, the pending create carries the latest fields.
    pub async fn apply_local_update(
        &self,
        account_id: &str,
        id: &str,
        name: &str,
        price_cents: i64,
        stock_qty: i64,
    ) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE product_mirror SET
                name = ?3,
                price_cents = ?4,
                stock_qty = ?5,
                sync_status = CASE sync_status WHEN 'new' THEN 'new' ELSE 'updated' END,
                updated_at = ?6
            WHERE account_id = ?1 AND id = ?2
            "#,
        )
        .bind(account_id)
        .bind(id)
        .bind(name)
        .bind(price_cents)
        .bind(stock_qty)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product mirror", id));
        }

        Ok(())
    }

    /// Deletes a local-only row outright; returns true when the row had
    /// never synced (caller then collapses the queued create).
    pub async fn delete_local(&self, account_id: &str, id: &str) -> DbResult<bool> {
        let status: Option<SyncStatus> = sqlx::query_scalar(
            "SELECT sync_status FROM product_mirror WHERE account_id = ?1 AND id = ?2",
        )
        .bind(account_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(status) = status else {
            return Ok(false);
        };

        if status == SyncStatus::New {
            sqlx::query("DELETE FROM product_mirror WHERE account_id = ?1 AND id = ?2")
                .bind(account_id)
                .bind(id)
                .execute(&self.pool)
                .await?;
            return Ok(true);
        }

        // Synced rows soft-delete locally and wait for the ledger ack.
        sqlx::query(
            r#"
            UPDATE product_mirror SET sync_status = 'deleted', updated_at = ?3
            WHERE account_id = ?1 AND id = ?2
            "#,
        )
        .bind(account_id)
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(false)
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
            UPDATE product_mirror SET
                server_id = ?3,
                sync_status = 'synced',
                updated_at = ?4
            WHERE account_id = ?1 AND id = ?2
            "#,
        )
        .bind(account_id)
        .bind(client_ref)
        .bind(server_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes rows whose deletion the ledger confirmed.
    pub async fn purge_deleted(&self, account_id: &str, id: &str) -> DbResult<()> {
        sqlx::query(
            "DELETE FROM product_mirror WHERE account_id = ?1 AND (id = ?2 OR server_id = ?2)",
        )
        .bind(account_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes every row belonging to an account (account switch).
    pub async fn clear_account(&self, account_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM product_mirror WHERE account_id = ?1")
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

    fn local_product(id: &str, account: &str) -> ProductMirror {
        ProductMirror {
            id: id.to_string(),
            account_id: account.to_string(),
            server_id: None,
            name: "Rice 1kg".to_string(),
            price_cents: 250,
            stock_qty: 40,
            track_stock: true,
            is_active: true,
            sync_status: SyncStatus::New,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_reconcile() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.products();

        repo.insert_local(&local_product("ref-1", "acc")).await.unwrap();
        repo.mark_synced("acc", "ref-1", "srv-9").await.unwrap();

        let row = repo.get("acc", "ref-1").await.unwrap().unwrap();
        assert_eq!(row.server_id.as_deref(), Some("srv-9"));
        assert_eq!(row.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_delete_local_reports_unsynced() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.products();

        repo.insert_local(&local_product("ref-1", "acc")).await.unwrap();
        let collapsed = repo.delete_local("acc", "ref-1").await.unwrap();
        assert!(collapsed);
        assert!(repo.get("acc", "ref-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_synced_row_soft_deletes() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.products();

        repo.insert_local(&local_product("ref-1", "acc")).await.unwrap();
        repo.mark_synced("acc", "ref-1", "srv-9").await.unwrap();

        let collapsed = repo.delete_local("acc", "ref-1").await.unwrap();
        assert!(!collapsed);

        let row = repo.get("acc", "ref-1").await.unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Deleted);
        // Soft-deleted rows disappear from the render list.
        assert!(repo.list("acc").await.unwrap().is_empty());
    }
}
