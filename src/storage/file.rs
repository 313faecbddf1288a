//! FileStorage - in-memory storage persisted write-through to a snapshot file.
//!
//! The snapshot is the whole store (entries plus revision counter) encoded
//! with bitcode. Each committed change rewrites it through a temporary file
//! and a rename, so a crash never leaves a half-written snapshot behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::in_memory::{Sink, State};
use super::{ContextId, Entry, InMemoryStorage, KeyValueStore, StorageError, Subscription, Write};

#[derive(Serialize, Deserialize)]
struct Snapshot {
    revision: u64,
    entries: Vec<(String, Entry)>,
}

impl Snapshot {
    fn from_state(state: &State) -> Self {
        let mut entries: Vec<(String, Entry)> = state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            revision: state.revision,
            entries,
        }
    }

    fn into_state(self) -> State {
        State {
            entries: self.entries.into_iter().collect(),
            revision: self.revision,
        }
    }
}

/// File-backed key-value storage.
///
/// Clones share the same in-memory state and change feed; only one
/// `FileStorage` should be opened per file.
#[derive(Clone)]
pub struct FileStorage {
    inner: InMemoryStorage,
    path: PathBuf,
}

impl FileStorage {
    /// Open (or create) the snapshot at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_quota(path, None)
    }

    /// Open with a byte quota, see [`InMemoryStorage::with_quota`].
    pub fn open_with_quota(
        path: impl AsRef<Path>,
        quota: Option<usize>,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let state = load_snapshot(&path)?;
        debug!(path = %path.display(), keys = state.entries.len(), "opened file storage");

        let sink_path = path.clone();
        let sink: Sink = Arc::new(move |state: &State| write_snapshot(&sink_path, state));

        Ok(Self {
            inner: InMemoryStorage::from_parts(state, quota, Some(sink)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_snapshot(path: &Path) -> Result<State, StorageError> {
    if !path.exists() {
        return Ok(State::default());
    }
    let bytes = fs::read(path).map_err(|e| StorageError::Io(e.to_string()))?;
    if bytes.is_empty() {
        return Ok(State::default());
    }
    let snapshot: Snapshot =
        bitcode::deserialize(&bytes).map_err(|e| StorageError::Snapshot(e.to_string()))?;
    Ok(snapshot.into_state())
}

fn write_snapshot(path: &Path, state: &State) -> Result<(), StorageError> {
    let bytes = bitcode::serialize(&Snapshot::from_state(state))
        .map_err(|e| StorageError::Snapshot(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| StorageError::Io(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| StorageError::Io(e.to_string()))
}

impl KeyValueStore for FileStorage {
    fn read(&self, key: &str) -> Result<Option<Entry>, StorageError> {
        self.inner.read(key)
    }

    fn write_all(&self, origin: ContextId, writes: &[Write]) -> Result<Vec<u64>, StorageError> {
        self.inner.write_all(origin, writes)
    }

    fn remove(&self, origin: ContextId, key: &str) -> Result<bool, StorageError> {
        self.inner.remove(origin, key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys()
    }

    fn subscribe(&self, context: ContextId) -> Subscription {
        self.inner.subscribe(context)
    }
}
