//! `SQLite` database for the bridge tables.

use std::path::Path;
use std::sync::Arc;

use davix_core::clock::{Clock, SystemClock};
use davix_core::db::{open_pool, open_pool_in_memory};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::schema::{Dialect, Table, TableNames, render_schema};

pub use davix_core::db::DatabaseError;

/// Handle to the bridge store.
///
/// Cheap to clone; clones share the connection pool, table names and clock.
#[derive(Clone)]
pub struct BridgeDatabase {
    pool: Pool<Sqlite>,
    tables: Arc<TableNames>,
    clock: Arc<dyn Clock>,
}

impl BridgeDatabase {
    /// Open or create a database at the given path and install the schema.
    pub async fn open(path: &Path, tables: TableNames) -> Result<Self, DatabaseError> {
        let pool = open_pool(path).await?;
        let db = Self::from_pool(pool, tables, Arc::new(SystemClock));
        db.install_schema().await?;
        Ok(db)
    }

    /// Open an in-memory database with the default `wp_` prefix (for testing).
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::open_in_memory_with_clock(Arc::new(SystemClock)).await
    }

    /// Open an in-memory database driven by the given clock (for testing).
    pub async fn open_in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, DatabaseError> {
        let pool = open_pool_in_memory().await?;
        let db = Self::from_pool(pool, TableNames::default(), clock);
        db.install_schema().await?;
        Ok(db)
    }

    fn from_pool(pool: Pool<Sqlite>, tables: TableNames, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            tables: Arc::new(tables),
            clock,
        }
    }

    /// Replace the clock used for timestamps and lease arithmetic.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create all bridge tables and indexes. Idempotent.
    pub async fn install_schema(&self) -> Result<(), DatabaseError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        for statement in render_schema(Dialect::Sqlite, &self.tables, "") {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        info!(prefix = %self.tables.prefix(), "Bridge schema installed");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Physical name of a bridge table.
    pub fn table(&self, table: Table) -> &str {
        self.tables.name(table)
    }

    /// Current time in Unix seconds, as seen by this store.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_works() {
        let db = BridgeDatabase::open_in_memory().await;
        assert!(db.is_ok());
    }

    #[tokio::test]
    async fn install_schema_is_idempotent() {
        let db = BridgeDatabase::open_in_memory().await.unwrap();
        db.install_schema().await.unwrap();

        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'wp_davix_bridge_%'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(row.0, 5);
    }

    #[tokio::test]
    async fn open_file_with_custom_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.db");
        let tables = TableNames::new("site2_").unwrap();

        let db = BridgeDatabase::open(&path, tables).await.unwrap();
        assert_eq!(db.table(Table::Logs), "site2_davix_bridge_logs");

        // Reopening an existing file must not fail on existing tables.
        drop(db);
        let tables = TableNames::new("site2_").unwrap();
        assert!(BridgeDatabase::open(&path, tables).await.is_ok());
    }
}
