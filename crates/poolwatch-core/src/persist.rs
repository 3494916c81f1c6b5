//! Durable persistence contract for the watcher aggregate.
//!
//! The whole [`crate::store::StoreData`] aggregate is persisted as one
//! document under a fixed logical name — load at startup, write-through on
//! every mutation. Backends live in `poolwatch-storage`.

use async_trait::async_trait;

use crate::error::WatchError;

/// Stores and loads opaque state documents by logical name.
///
/// Writes must be atomic enough that a crash mid-write never corrupts
/// previously committed state (the last known good document stays
/// recoverable).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the document, or `None` if nothing was ever saved.
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, WatchError>;

    /// Save (replace) the document.
    async fn save(&self, name: &str, payload: &[u8]) -> Result<(), WatchError>;

    /// Delete the document (e.g. when resetting the watcher).
    async fn delete(&self, name: &str) -> Result<(), WatchError>;
}
