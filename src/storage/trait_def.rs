use crate::counter::models::Store;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize counter document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("write queue is closed")]
    QueueClosed,
    #[error("mutation panicked; its changes were discarded")]
    MutationPanicked,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Whole-document persistence for the counter store
///
/// Implementations must make `save` atomic for concurrent `load` callers: a
/// reader sees either the previous document or the new one, never a mix.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Load the current document, repaired to the current schema
    ///
    /// Missing or unparseable data yields an empty store rather than an error.
    async fn load(&self) -> StorageResult<Store>;

    /// Replace the persisted document
    async fn save(&self, store: &Store) -> StorageResult<()>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}
