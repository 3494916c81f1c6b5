//! JSON-file state backend.
//!
//! One `{name}.json` document per logical name under a data directory. A
//! save writes the full payload to a temp file in the same directory, syncs
//! it, and renames it over the target — a crash mid-write leaves the last
//! committed document intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use poolwatch_core::error::WatchError;
use poolwatch_core::persist::StateStore;

/// Directory-backed document store.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Open (creating the directory if needed).
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, WatchError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WatchError::Storage(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn tmp_path(&self, name: &str) -> PathBuf {
        // Same directory, so the rename stays on one filesystem.
        self.dir.join(format!(".{name}.json.tmp"))
    }
}

fn io_err(op: &str, path: &Path, e: std::io::Error) -> WatchError {
    WatchError::Storage(format!("{op} {}: {e}", path.display()))
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, WatchError> {
        let path = self.path(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("read", &path, e)),
        }
    }

    async fn save(&self, name: &str, payload: &[u8]) -> Result<(), WatchError> {
        let tmp = self.tmp_path(name);
        let path = self.path(name);

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| io_err("create", &tmp, e))?;
        file.write_all(payload)
            .await
            .map_err(|e| io_err("write", &tmp, e))?;
        file.sync_all().await.map_err(|e| io_err("sync", &tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err("rename", &tmp, e))?;

        debug!(name, bytes = payload.len(), "state saved");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), WatchError> {
        let path = self.path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("remove", &path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();

        assert!(store.load("state").await.unwrap().is_none());

        store.save("state", b"{\"v\":1}").await.unwrap();
        assert_eq!(store.load("state").await.unwrap().unwrap(), b"{\"v\":1}");

        // Overwrite replaces the whole document.
        store.save("state", b"{\"v\":2}").await.unwrap();
        assert_eq!(store.load("state").await.unwrap().unwrap(), b"{\"v\":2}");
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStateStore::open(dir.path()).await.unwrap();
            store.save("state", b"persisted").await.unwrap();
        }
        let store = FileStateStore::open(dir.path()).await.unwrap();
        assert_eq!(store.load("state").await.unwrap().unwrap(), b"persisted");
    }

    #[tokio::test]
    async fn stale_tmp_file_does_not_shadow_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        store.save("state", b"good").await.unwrap();

        // Simulate a crash that left a half-written temp file behind.
        tokio::fs::write(dir.path().join(".state.json.tmp"), b"half-wri")
            .await
            .unwrap();

        assert_eq!(store.load("state").await.unwrap().unwrap(), b"good");
        // And the next save still lands cleanly.
        store.save("state", b"newer").await.unwrap();
        assert_eq!(store.load("state").await.unwrap().unwrap(), b"newer");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();

        store.save("state", b"x").await.unwrap();
        store.delete("state").await.unwrap();
        store.delete("state").await.unwrap(); // second delete is a no-op
        assert!(store.load("state").await.unwrap().is_none());
    }
}
