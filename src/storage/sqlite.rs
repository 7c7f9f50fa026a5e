use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use super::{Backend, Result};

/// Key under which the job list is stored unless configured otherwise
pub const DEFAULT_STORAGE_KEY: &str = "jobs";

/// SQLite-backed key-value slot for the job list
pub struct SqliteBackend {
    pool: SqlitePool,
    key: String,
}

impl SqliteBackend {
    pub async fn new(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(database_url).await?;
        let backend = Self {
            pool,
            key: DEFAULT_STORAGE_KEY.to_string(),
        };
        backend.configure().await?;
        backend.migrate().await?;
        Ok(backend)
    }

    /// Store the job list under a different key, so several queues can share one database
    pub fn with_key<S: Into<String>>(mut self, key: S) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn configure(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await?;

        sqlx::query("PRAGMA busy_timeout=5000;")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn migrate(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_store (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM queue_store WHERE key = ?")
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<Vec<u8>, _>("value")))
    }

    async fn save(&self, bytes: Vec<u8>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.key)
        .bind(bytes)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
