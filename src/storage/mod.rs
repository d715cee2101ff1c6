pub mod file;
pub mod memory;
pub mod trait_def;
pub mod writer;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use trait_def::{CounterStore, StorageError, StorageResult};
pub use writer::WriteSerializer;

use crate::config::{StorageBackend, StorageConfig};
use std::sync::Arc;

/// Build the configured store backend
pub fn open(config: &StorageConfig) -> Arc<dyn CounterStore> {
    match config.backend {
        StorageBackend::File => Arc::new(FileStore::new(config.data_file.clone())),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    }
}
