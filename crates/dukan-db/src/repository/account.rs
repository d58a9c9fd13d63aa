//! # Account Repository
//!
//! Tracks the signed-in account on this device and enforces tenant
//! isolation across account switches.
//!
//! ## Why Switching Clears Data
//! The local store persists across restarts and is shared by every identity
//! that signs in on the device. Queue entries and mirror rows from account A
//! must never be visible (or worse, transmitted) under account B's
//! session, so a switch deletes the previous identity's rows before
//! activating the new one.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Meta key under which the active account id is stored.
const ACTIVE_ACCOUNT_KEY: &str = "active_account";

/// Repository for device account state.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    /// Returns the currently active account id, if any.
    pub async fn active(&self) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_meta WHERE key = ?1")
                .bind(ACTIVE_ACCOUNT_KEY)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Activates an account, clearing the previous identity's local data
    /// when the account actually changes.
    ///
    /// Queue rows are unsynced by definition; mirror rows are re-hydratable
    /// caches. Both go.
    pub async fn switch(&self, account_id: &str) -> DbResult<()> {
        let previous = self.active().await?;

        if previous.as_deref() == Some(account_id) {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        if let Some(ref old) = previous {
            info!(old_account = %old, new_account = %account_id, "Switching device account");

            sqlx::query("DELETE FROM sync_queue WHERE account_id = ?1")
                .bind(old)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM product_mirror WHERE account_id = ?1")
                .bind(old)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM sale_mirror WHERE account_id = ?1")
                .bind(old)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM expense_mirror WHERE account_id = ?1")
                .bind(old)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM cash_mirror WHERE account_id = ?1")
                .bind(old)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO app_meta (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(ACTIVE_ACCOUNT_KEY)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use chrono::Utc;
    use dukan_core::{
        CashDirection, CashEntryPayload, OperationPayload, ProductMirror, SyncStatus,
    };

    #[tokio::test]
    async fn test_switch_clears_previous_identity() {
        let db = Database::in_memory().await.unwrap();
        let accounts = db.accounts();

        accounts.switch("user-a").await.unwrap();
        assert_eq!(accounts.active().await.unwrap().as_deref(), Some("user-a"));

        // Queue an operation and a mirror row as user A.
        db.queue()
            .append(
                "user-a",
                &OperationPayload::CashCreate(CashEntryPayload {
                    client_ref: "ref-1".to_string(),
                    direction: CashDirection::CashIn,
                    amount_cents: 500,
                    reason: None,
                    recorded_at: Utc::now(),
                }),
            )
            .await
            .unwrap();
        db.products()
            .insert_local(&ProductMirror {
                id: "ref-p".to_string(),
                account_id: "user-a".to_string(),
                server_id: None,
                name: "Sugar".to_string(),
                price_cents: 120,
                stock_qty: 5,
                track_stock: true,
                is_active: true,
                sync_status: SyncStatus::New,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        // Switch to user B without syncing.
        accounts.switch("user-b").await.unwrap();

        // None of user A's queued or mirrored data survives.
        assert_eq!(db.queue().count_pending("user-a").await.unwrap(), 0);
        assert!(db.products().list("user-a").await.unwrap().is_empty());
        assert_eq!(accounts.active().await.unwrap().as_deref(), Some("user-b"));
    }

    #[tokio::test]
    async fn test_switch_to_same_account_is_noop() {
        let db = Database::in_memory().await.unwrap();
        let accounts = db.accounts();

        accounts.switch("user-a").await.unwrap();
        db.queue()
            .append(
                "user-a",
                &OperationPayload::CashCreate(CashEntryPayload {
                    client_ref: "ref-1".to_string(),
                    direction: CashDirection::CashIn,
                    amount_cents: 500,
                    reason: None,
                    recorded_at: Utc::now(),
                }),
            )
            .await
            .unwrap();

        accounts.switch("user-a").await.unwrap();
        assert_eq!(db.queue().count_pending("user-a").await.unwrap(), 1);
    }
}
