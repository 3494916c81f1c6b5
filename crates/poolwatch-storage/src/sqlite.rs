//! SQLite state backend.
//!
//! Persists state documents in a single `state` table with WAL mode
//! enabled. An alternative to the file backend when the watcher shares a
//! database with other tooling.
//!
//! # Usage
//! ```rust,no_run
//! use poolwatch_storage::sqlite::SqliteStateStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStateStore::open("./poolwatch.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStateStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use poolwatch_core::error::WatchError;
use poolwatch_core::persist::StateStore;

/// SQLite-backed document store.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./poolwatch.db"`) or a full
    /// SQLite URL (`"sqlite:./poolwatch.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, WatchError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| WatchError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database. All data is lost when the pool is
    /// dropped.
    pub async fn in_memory() -> Result<Self, WatchError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| WatchError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), WatchError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| WatchError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS state (
                name       TEXT PRIMARY KEY,
                payload    BLOB    NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| WatchError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, WatchError> {
        let row = sqlx::query("SELECT payload FROM state WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WatchError::Storage(e.to_string()))?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("payload")))
    }

    async fn save(&self, name: &str, payload: &[u8]) -> Result<(), WatchError> {
        sqlx::query(
            "INSERT OR REPLACE INTO state (name, payload, updated_at)
             VALUES (?, ?, strftime('%s','now'))",
        )
        .bind(name)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| WatchError::Storage(e.to_string()))?;

        debug!(name, bytes = payload.len(), "state saved");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), WatchError> {
        sqlx::query("DELETE FROM state WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| WatchError::Storage(e.to_string()))?;

        Ok(())
    }
}
