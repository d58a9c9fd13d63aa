//! # Database Migrations
//!
//! Embedded SQL migrations for the device-local store.
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/client/` with the next sequence number
//! 2. Name format: `NNN_description.sql` (e.g., `002_add_receipts.sql`)
//! 3. Write idempotent SQL (use `IF NOT EXISTS` where possible)
//! 4. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/client` directory.
///
/// The `sqlx::migrate!()` macro embeds all SQL files from the specified
/// directory into the binary at compile time. No runtime file access needed.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/client");

/// Runs all pending database migrations.
///
/// Idempotent and ordered: each migration runs once, in filename order, in
/// its own transaction, tracked in `_sqlx_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending local store migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied");
    Ok(())
}
