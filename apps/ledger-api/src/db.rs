//! Database layer for the Ledger API.
//!
//! Provides SQLite connectivity, embedded migrations, enrollment helpers,
//! and the record structs handlers map rows into. Batch handlers run their
//! own transactions directly against the pool: one transaction per logical
//! unit, as the commit contract requires.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

/// Embedded migrations for the shared ledger schema.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/server");

/// Ledger database handle.
#[derive(Clone)]
pub struct LedgerDb {
    pool: SqlitePool,
}

impl LedgerDb {
    /// Connect to the ledger database and run migrations.
    pub async fn connect(path: &str) -> Result<Self, ApiError> {
        info!(path = %path, "Connecting to ledger database");

        let url = format!("sqlite://{}?mode=rwc", path);
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| ApiError::Database(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        let db = LedgerDb { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Opens an in-memory ledger with migrations applied (for tests).
    pub async fn in_memory() -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| ApiError::Database(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        let db = LedgerDb { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), ApiError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Enrollment Operations
    // =========================================================================

    /// Creates a shop.
    pub async fn create_shop(&self, id: &str, name: &str) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO shops (id, name, is_active, created_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Registers a device under a shop, storing the API key as an argon2
    /// hash.
    pub async fn create_device(
        &self,
        shop_id: &str,
        device_id: &str,
        name: &str,
        api_key: &str,
    ) -> Result<(), ApiError> {
        let hash = hash_api_key(api_key)?;

        sqlx::query(
            r#"
            INSERT INTO devices (id, shop_id, name, api_key_hash, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(device_id)
        .bind(shop_id)
        .bind(name)
        .bind(hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Looks up an active device for enrollment, verifying its API key.
    pub async fn authenticate_device(
        &self,
        shop_id: &str,
        device_id: &str,
        api_key: &str,
    ) -> Result<Option<DeviceRecord>, ApiError> {
        let device = sqlx::query_as::<_, DeviceRecord>(
            r#"
            SELECT id, shop_id, name, api_key_hash, is_active, created_at
            FROM devices
            WHERE id = ?1 AND shop_id = ?2 AND is_active = 1
            "#,
        )
        .bind(device_id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref record) = device {
            if !verify_api_key(api_key, &record.api_key_hash) {
                return Ok(None);
            }
        }

        Ok(device)
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRecord {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    pub api_key_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRecord {
    pub id: String,
    pub shop_id: String,
    pub client_ref: String,
    pub name: String,
    pub price_cents: i64,
    pub cost_cents: Option<i64>,
    pub stock_qty: i64,
    pub track_stock: bool,
    pub is_active: bool,
    pub sync_version: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRecord {
    pub id: String,
    pub shop_id: String,
    pub client_ref: String,
    pub name: String,
    pub due_cents: i64,
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Generates an entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Verify an API key against its hash.
pub fn verify_api_key(api_key: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(api_key.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Hash an API key for storage.
pub fn hash_api_key(api_key: &str) -> Result<String, ApiError> {
    use argon2::{
        password_hash::{rand_core::OsRng, SaltString},
        Argon2, PasswordHasher,
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(api_key.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("Failed to hash API key: {}", e)))?;

    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_hash_roundtrip() {
        let hash = hash_api_key("counter-1-key").unwrap();
        assert!(verify_api_key("counter-1-key", &hash));
        assert!(!verify_api_key("wrong-key", &hash));
    }

    #[tokio::test]
    async fn test_device_authentication() {
        let db = LedgerDb::in_memory().await.unwrap();
        db.create_shop("shop-1", "Test Shop").await.unwrap();
        db.create_device("shop-1", "dev-1", "Counter 1", "secret")
            .await
            .unwrap();

        let device = db
            .authenticate_device("shop-1", "dev-1", "secret")
            .await
            .unwrap();
        assert!(device.is_some());

        let rejected = db
            .authenticate_device("shop-1", "dev-1", "wrong")
            .await
            .unwrap();
        assert!(rejected.is_none());
    }
}
