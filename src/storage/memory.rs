use crate::counter::models::Store;
use crate::storage::{CounterStore, StorageResult};
use async_trait::async_trait;
use std::sync::Mutex;

/// Process-local store, lost on exit
///
/// The document is cloned in and out as a whole, which gives the same
/// no-torn-read guarantee as the file backend.
#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<Store>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn load(&self) -> StorageResult<Store> {
        let guard = self.document.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    async fn save(&self, store: &Store) -> StorageResult<()> {
        let mut guard = self.document.lock().unwrap_or_else(|e| e.into_inner());
        *guard = store.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
