//! SQLite-backed coordination store.
//!
//! A shared database file stands in for a networked key/value service:
//! every front-door and worker process opens the same file, and SQLite's
//! locking provides the last-writer-wins semantics the trait promises.

use sqlx::SqlitePool;

use crate::coord::{BoxFuture, CoordStore};
use crate::error::StoreError;

pub struct SqliteCoordStore {
    pool: SqlitePool,
}

impl SqliteCoordStore {
    /// Open (creating if needed) the store at `url`, e.g.
    /// `sqlite:///var/lib/quarry/coord.db?mode=rwc` or `sqlite::memory:`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be opened or table creation fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(url).await?;
        let store = Self { pool };
        store.init().await?;
        tracing::debug!(url, "coordination store ready");
        Ok(store)
    }

    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the kv and queue tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statements fail.
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS coord_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS coord_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue TEXT NOT NULL,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_coord_queue_name ON coord_queue (queue, id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl std::fmt::Debug for SqliteCoordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCoordStore").finish_non_exhaustive()
    }
}

impl CoordStore for SqliteCoordStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        let key = key.to_owned();
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM coord_kv WHERE key = ?")
                    .bind(&key)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(v,)| v))
        })
    }

    fn set(&self, key: &str, value: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO coord_kv (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(&key)
            .bind(&value)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_owned();
        Box::pin(async move {
            sqlx::query("DELETE FROM coord_kv WHERE key = ?")
                .bind(&key)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let key = key.to_owned();
        Box::pin(async move {
            let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM coord_kv WHERE key = ?")
                .bind(&key)
                .fetch_one(&self.pool)
                .await?;
            Ok(row.0 > 0)
        })
    }

    fn push(&self, queue: &str, value: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let queue = queue.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            sqlx::query("INSERT INTO coord_queue (queue, value) VALUES (?, ?)")
                .bind(&queue)
                .bind(&value)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn pop(&self, queue: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        let queue = queue.to_owned();
        Box::pin(async move {
            // Single-consumer queues per analyzer, so a read-then-delete
            // pair without a transaction cannot double-deliver.
            let row: Option<(i64, String)> = sqlx::query_as(
                "SELECT id, value FROM coord_queue WHERE queue = ? ORDER BY id LIMIT 1",
            )
            .bind(&queue)
            .fetch_optional(&self.pool)
            .await?;
            let Some((id, value)) = row else {
                return Ok(None);
            };
            sqlx::query("DELETE FROM coord_queue WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(Some(value))
        })
    }

    fn delete_prefix(&self, prefix: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        Box::pin(async move {
            let kv = sqlx::query("DELETE FROM coord_kv WHERE key LIKE ? ESCAPE '\\'")
                .bind(&pattern)
                .execute(&self.pool)
                .await?;
            let q = sqlx::query("DELETE FROM coord_queue WHERE queue LIKE ? ESCAPE '\\'")
                .bind(&pattern)
                .execute(&self.pool)
                .await?;
            Ok(usize::try_from(kv.rows_affected() + q.rows_affected()).unwrap_or(usize::MAX))
        })
    }
}
