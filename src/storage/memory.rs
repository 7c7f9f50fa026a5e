use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Backend, Result};

/// Keeps the job list in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    bytes: RwLock<Option<Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.bytes.read().await.clone())
    }

    async fn save(&self, bytes: Vec<u8>) -> Result<()> {
        *self.bytes.write().await = Some(bytes);
        Ok(())
    }
}
