//! `SQLite` pool setup and the storage error type.

use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

/// How long a writer waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const FILE_POOL_SIZE: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl DatabaseError {
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(e.to_string())
            }
            _ => Self::Query(e.to_string()),
        }
    }
}

/// Open (or create) a file-backed pool. The parent directory is created if
/// needed; connections use WAL, foreign keys and [`BUSY_TIMEOUT`].
pub async fn open_pool(path: &Path) -> Result<Pool<Sqlite>, DatabaseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io(e.to_string()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = connect(options, FILE_POOL_SIZE).await?;
    info!(path = %path.display(), "Database opened");
    Ok(pool)
}

/// Open an in-memory pool (for testing).
///
/// Held to one connection: each `:memory:` connection is a separate database.
pub async fn open_pool_in_memory() -> Result<Pool<Sqlite>, DatabaseError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| DatabaseError::Connection(e.to_string()))?
        .foreign_keys(true);

    connect(options, 1).await
}

async fn connect(
    options: SqliteConnectOptions,
    max_connections: u32,
) -> Result<Pool<Sqlite>, DatabaseError> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))
}

/// Current time as Unix seconds.
pub fn unix_timestamp() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_timestamp_is_reasonable() {
        // After 2024-01-01
        assert!(unix_timestamp() > 1_704_067_200);
    }

    #[tokio::test]
    async fn unique_violation_maps_to_conflict() {
        let pool = open_pool_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE t (k TEXT NOT NULL UNIQUE)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (k) VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap();

        let err: DatabaseError = sqlx::query("INSERT INTO t (k) VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();
        assert!(err.is_conflict(), "expected conflict, got {err:?}");
    }

    #[tokio::test]
    async fn other_failures_map_to_query() {
        let pool = open_pool_in_memory().await.unwrap();
        let err: DatabaseError = sqlx::query("SELECT * FROM missing")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DatabaseError::Query(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn open_pool_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bridge.db");
        let pool = open_pool(&path).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }
}
