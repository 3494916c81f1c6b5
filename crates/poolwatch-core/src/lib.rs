//! poolwatch-core — finalized-head tracking and reward snapshot engine.
//!
//! # Architecture
//!
//! ```text
//! watch_heads → RetryDriver
//!                   ├── HeadTracker        (poll finalized head, emit ticks)
//!                   ├── SnapshotTick       (one engine tick per new head)
//!                   └── StandardHooks      (retry / escalate policy)
//! engine::tick  ── reads ──→ SubscriptionStore ── write-through ──→ StateStore
//! ```
//!
//! The chain client and the durable backend are trait seams
//! ([`chain::ChainClient`], [`persist::StateStore`]); concrete backends live
//! in `poolwatch-storage`, the RPC transport outside this workspace.

pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod head;
pub mod persist;
pub mod report;
pub mod retry;
pub mod rewards;
pub mod store;
pub mod types;

pub use chain::{account_exists, AtHead, ChainClient, PoolState, StakerPosition};
pub use config::WatchConfig;
pub use error::WatchError;
pub use head::{shutdown_channel, watch_heads, HeadTracker, SnapshotTick, StandardHooks};
pub use persist::StateStore;
pub use report::{format_report, record_delta, Delta};
pub use retry::{ErrorDirective, RetryDriver, RetryHooks, TickAction, TickItem, TickSource};
pub use store::{StoreData, SubscriptionStore};
pub use types::{Head, PoolEntry, Snapshot, SubKey, SubscriptionRecord};
