pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable key-value slot holding the whole serialized job list.
///
/// `save` replaces the stored bytes entirely; there is no partial update.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stored bytes, or `None` if nothing has been saved yet
    async fn load(&self) -> Result<Option<Vec<u8>>>;
    async fn save(&self, bytes: Vec<u8>) -> Result<()>;
}
