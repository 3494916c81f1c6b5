//! Error types for the watcher pipeline.

use thiserror::Error;

/// Errors that can occur while tracking heads and computing snapshots.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Chain RPC failure (network flakiness, node hiccup) — retryable.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The chain client reported loss of connectivity. No further progress
    /// is possible; escalated as process-fatal by the standard hooks.
    #[error("Chain client disconnected")]
    Disconnected,

    /// Durable store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A claimable figure came out negative. This indicates a data or
    /// arithmetic assumption violation (accumulator behind debt) and is
    /// surfaced rather than clamped to zero.
    #[error("Negative claimable for account {account} in pool {pid}: {computed}")]
    AnomalousNegativeReward {
        pid: u64,
        account: String,
        computed: String,
    },

    /// The chat already watches this (pool, account) pair.
    #[error("Chat {chat} is already subscribed to {key}")]
    AlreadySubscribed { chat: String, key: String },

    /// The chat does not watch this (pool, account) pair.
    #[error("Chat {chat} is not subscribed to {key}")]
    NotSubscribed { chat: String, key: String },

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl WatchError {
    /// Returns `true` if the error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}
