//! In-memory state backend.
//!
//! All data is lost when the process exits. Useful for tests and ephemeral
//! watchers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use poolwatch_core::error::WatchError;
use poolwatch_core::persist::StateStore;

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStateStore {
    docs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.docs.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, WatchError> {
        Ok(self.docs.lock().unwrap().get(name).cloned())
    }

    async fn save(&self, name: &str, payload: &[u8]) -> Result<(), WatchError> {
        self.docs
            .lock()
            .unwrap()
            .insert(name.to_string(), payload.to_vec());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), WatchError> {
        self.docs.lock().unwrap().remove(name);
        Ok(())
    }
}
