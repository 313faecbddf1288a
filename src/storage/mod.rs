//! Storage - Versioned key-value storage shared between catalog views.
//!
//! Values are JSON strings stored under well-known keys (`library_books`,
//! `library_users`, `borrow_records`, ...). Every change stamps the entry
//! with the store's next revision, so versions are monotonic across the whole
//! store and never reused, even after a key is removed and written again.
//!
//! Writes are compare-and-swap capable: a [`Write`] can carry the version the
//! writer last read, and a batch is rejected as a whole if any of them moved.
//!
//! ## Example
//!
//! ```
//! use shared_catalog::storage::{ContextId, InMemoryStorage, KeyValueStore, Write};
//!
//! let storage = InMemoryStorage::new();
//! let tab = ContextId::next();
//! let other = storage.subscribe(ContextId::next());
//!
//! let versions = storage.write_all(tab, &[Write::put("library_books", "[]")]).unwrap();
//! assert_eq!(versions, vec![1]);
//!
//! // Stale writers are rejected.
//! let stale = Write::put("library_books", "[{}]").expecting(0);
//! assert!(storage.write_all(tab, &[stale]).is_err());
//!
//! // Other contexts hear about the change.
//! assert_eq!(other.drain().len(), 1);
//! ```

mod feed;
#[cfg(feature = "file")]
mod file;
mod in_memory;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use feed::Subscription;
#[cfg(feature = "file")]
pub use file::FileStorage;
pub use in_memory::InMemoryStorage;

/// Identifies the view (tab/document) that performed a change.
///
/// Change events are never delivered back to the context that caused them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    /// Writes that do not come from any view (seeding tools, simulated
    /// scanners, tests).
    pub const EXTERNAL: ContextId = ContextId(0);

    /// Allocate a fresh, process-unique context id.
    pub fn next() -> Self {
        ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A stored value and the revision at which it last changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub value: String,
    pub version: u64,
}

/// One key/value assignment inside a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub key: String,
    pub value: String,
    /// Version the writer expects the key to have; `Some(0)` means absent.
    pub expected: Option<u64>,
}

impl Write {
    /// Unconditional write.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expected: None,
        }
    }

    /// Only apply if the key is still at `version`.
    pub fn expecting(mut self, version: u64) -> Self {
        self.expected = Some(version);
        self
    }
}

/// Notification that a key changed, delivered to every other context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    pub version: u64,
    pub origin: ContextId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// A compare-and-swap expectation did not hold.
    #[error("version conflict on {key} (expected {expected}, actual {actual})")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("storage quota exceeded writing {key} ({needed} bytes, limit {limit})")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("storage lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("storage io error: {0}")]
    Io(String),

    #[error("storage snapshot error: {0}")]
    Snapshot(String),
}

/// Abstract versioned key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a key. Returns `None` if absent.
    fn read(&self, key: &str) -> Result<Option<Entry>, StorageError>;

    /// Apply a batch atomically. Returns the resulting version of each write,
    /// in order. Writes whose value equals the stored one leave the version
    /// untouched and produce no event.
    fn write_all(&self, origin: ContextId, writes: &[Write]) -> Result<Vec<u64>, StorageError>;

    /// Remove a key. Returns true if it existed.
    fn remove(&self, origin: ContextId, key: &str) -> Result<bool, StorageError>;

    /// All keys currently present.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Open a change feed for `context`.
    fn subscribe(&self, context: ContextId) -> Subscription;

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read(key)?.map(|entry| entry.value))
    }

    fn set_item(&self, origin: ContextId, key: &str, value: &str) -> Result<u64, StorageError> {
        let versions = self.write_all(origin, &[Write::put(key, value)])?;
        Ok(versions.first().copied().unwrap_or_default())
    }

    /// Current version of a key, 0 if absent.
    fn version(&self, key: &str) -> Result<u64, StorageError> {
        Ok(self.read(key)?.map_or(0, |entry| entry.version))
    }
}
