//! Durable checkpoint storage.
//!
//! The checkpoint is a single named value: read once at startup, rewritten
//! after every successful reconciliation, removed on session teardown.

use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tether_engine::Checkpoint;

use crate::error::Error;

/// Client-local durable storage for the reconciliation checkpoint.
pub trait CheckpointStore: Send + Sync {
    /// Read the persisted checkpoint, if any.
    fn load(&self) -> Result<Option<Checkpoint>, Error>;

    /// Persist the checkpoint.
    fn save(&self, checkpoint: Checkpoint) -> Result<(), Error>;

    /// Remove the persisted checkpoint.
    fn clear(&self) -> Result<(), Error>;
}

#[derive(Serialize, Deserialize)]
struct StoredCheckpoint {
    checkpoint: Checkpoint,
}

/// File-backed [`CheckpointStore`]: one small JSON document, replaced via
/// temp-file rename so a crash mid-write cannot leave a torn value.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, Error> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(e.to_string())),
        };
        let stored: StoredCheckpoint =
            serde_json::from_slice(&raw).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Some(stored.checkpoint))
    }

    fn save(&self, checkpoint: Checkpoint) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Storage(e.to_string()))?;
        }
        let body = serde_json::to_vec(&StoredCheckpoint { checkpoint })
            .map_err(|e| Error::Storage(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &body).map_err(|e| Error::Storage(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(e.to_string())),
        }
    }
}

/// In-memory [`CheckpointStore`] for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    value: Mutex<Option<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, Error> {
        Ok(*self.value.lock())
    }

    fn save(&self, checkpoint: Checkpoint) -> Result<(), Error> {
        *self.value.lock() = Some(checkpoint);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        *self.value.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        assert!(store.load().unwrap().is_none());

        store.save(Checkpoint::new(42_000)).unwrap();
        assert_eq!(store.load().unwrap(), Some(Checkpoint::new(42_000)));

        // Overwrite survives a reload.
        store.save(Checkpoint::new(43_000)).unwrap();
        assert_eq!(store.load().unwrap(), Some(Checkpoint::new(43_000)));
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        store.save(Checkpoint::new(1)).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("nested/state/checkpoint.json"));

        store.save(Checkpoint::new(7)).unwrap();
        assert_eq!(store.load().unwrap(), Some(Checkpoint::new(7)));
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(Checkpoint::new(5)).unwrap();
        assert_eq!(store.load().unwrap(), Some(Checkpoint::new(5)));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
