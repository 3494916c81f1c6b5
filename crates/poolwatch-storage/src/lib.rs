//! poolwatch-storage — durable [`StateStore`] backends.
//!
//! The watcher persists its whole aggregate as one JSON document per logical
//! name. Backends:
//! - [`memory::MemoryStateStore`] — tests and ephemeral runs.
//! - [`file::FileStateStore`] — one file per name under a data directory,
//!   written via temp-file-and-rename so a crash never corrupts the last
//!   committed state.
//! - `sqlite::SqliteStateStore` (feature `sqlite`) — single upsert table.
//!
//! [`StateStore`]: poolwatch_core::persist::StateStore

pub mod file;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileStateStore;
#[cfg(feature = "memory")]
pub use memory::MemoryStateStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStateStore;
