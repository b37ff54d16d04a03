pub mod file_store;

pub use file_store::JsonFileStore;

use async_trait::async_trait;
use krakenwatch_core::{AgentMemory, MemoryStore, StoreError};
use tokio::sync::Mutex;

/// Memory kept only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    memory: Mutex<AgentMemory>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory(memory: AgentMemory) -> Self {
        Self {
            memory: Mutex::new(memory),
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self) -> Result<AgentMemory, StoreError> {
        Ok(self.memory.lock().await.clone())
    }

    async fn save(&self, memory: &AgentMemory) -> Result<(), StoreError> {
        *self.memory.lock().await = memory.clone();
        Ok(())
    }
}
