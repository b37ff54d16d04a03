use crate::models::*;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Order Source Trait
// ---------------------------------------------------------------------------

/// Errors that can occur while fetching open orders.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Clock unavailable: {0}")]
    Clock(String),
    #[error("Signing failed: {0}")]
    Sign(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Unexpected response format: {0}")]
    ResponseFormat(String),
    #[error("Exchange returned errors: {}", .0.join(", "))]
    Exchange(Vec<String>),
}

/// Fetches the currently open orders from an exchange.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Perform one authenticated fetch and return the open orders.
    async fn open_orders(&self) -> Result<OrderSet, SourceError>;
}

// ---------------------------------------------------------------------------
// Event Sink Trait
// ---------------------------------------------------------------------------

/// Errors raised when handing an event to a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Sink closed")]
    Closed,
}

/// Receives the orders an agent decided to emit.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit a single order. The payload must be passed on unmodified.
    async fn emit(&self, order: &OpenOrder) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// Memory Store Trait
// ---------------------------------------------------------------------------

/// Errors from loading or saving agent memory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt memory record: {0}")]
    Corrupt(String),
}

/// Persists `AgentMemory` between polls.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Load the stored memory. A store that has never been written returns the default.
    async fn load(&self) -> Result<AgentMemory, StoreError>;

    /// Replace the stored memory.
    async fn save(&self, memory: &AgentMemory) -> Result<(), StoreError>;
}
