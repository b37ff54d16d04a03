use async_trait::async_trait;
use krakenwatch_core::{AgentMemory, MemoryStore, StoreError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Agent memory persisted as a JSON document on disk.
///
/// A missing file reads as empty memory. Writes go to a sibling temp file
/// that is then renamed over the target, so a crash mid-write never leaves a
/// truncated record behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "memory.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn load(&self) -> Result<AgentMemory, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No memory file yet");
                return Ok(AgentMemory::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, memory: &AgentMemory) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(memory)
            .map_err(|e| StoreError::Corrupt(format!("Serialization error: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "Saved agent memory");
        Ok(())
    }
}
