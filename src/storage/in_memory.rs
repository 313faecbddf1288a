//! InMemoryStorage - HashMap-backed storage shared by every clone.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::feed::ChangeFeed;
use super::{ContextId, Entry, KeyValueStore, StorageError, StorageEvent, Subscription, Write};

/// Committed contents plus the store-wide revision counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    pub(crate) entries: HashMap<String, Entry>,
    pub(crate) revision: u64,
}

impl State {
    fn usage(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, entry)| key.len() + entry.value.len())
            .sum()
    }
}

/// Hook run with the next state before it is committed. An error aborts the
/// write and leaves the committed state untouched.
pub(crate) type Sink = Arc<dyn Fn(&State) -> Result<(), StorageError> + Send + Sync>;

/// In-memory key-value storage.
///
/// Clone-friendly via Arc: every clone is another handle to the same entries
/// and the same change feed, the way every tab of a browser shares one
/// origin's local storage.
#[derive(Clone)]
pub struct InMemoryStorage {
    state: Arc<RwLock<State>>,
    feed: Arc<ChangeFeed>,
    quota: Option<usize>,
    sink: Option<Sink>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Create a new empty storage with no size limit.
    pub fn new() -> Self {
        Self::from_parts(State::default(), None, None)
    }

    /// Create a storage that rejects writes pushing the total size of keys and
    /// values past `limit` bytes.
    pub fn with_quota(limit: usize) -> Self {
        Self::from_parts(State::default(), Some(limit), None)
    }

    pub(crate) fn from_parts(state: State, quota: Option<usize>, sink: Option<Sink>) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            feed: Arc::new(ChangeFeed::default()),
            quota,
            sink,
        }
    }

    /// Bytes currently used by keys and values.
    pub fn usage(&self) -> Result<usize, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::LockPoisoned("usage"))?;
        Ok(state.usage())
    }

    /// Latest revision handed out by this store.
    pub fn revision(&self) -> Result<u64, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::LockPoisoned("revision"))?;
        Ok(state.revision)
    }

    fn check_quota(&self, next: &State, key: &str) -> Result<(), StorageError> {
        match self.quota {
            Some(limit) if next.usage() > limit => Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed: next.usage(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    fn persist(&self, next: &State) -> Result<(), StorageError> {
        match &self.sink {
            Some(sink) => sink(next),
            None => Ok(()),
        }
    }
}

impl KeyValueStore for InMemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Entry>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::LockPoisoned("read"))?;
        Ok(state.entries.get(key).cloned())
    }

    fn write_all(&self, origin: ContextId, writes: &[Write]) -> Result<Vec<u64>, StorageError> {
        let (versions, events) = {
            let mut state = self
                .state
                .write()
                .map_err(|_| StorageError::LockPoisoned("write"))?;

            for write in writes {
                if let Some(expected) = write.expected {
                    let actual = state.entries.get(&write.key).map_or(0, |e| e.version);
                    if actual != expected {
                        return Err(StorageError::Conflict {
                            key: write.key.clone(),
                            expected,
                            actual,
                        });
                    }
                }
            }

            let mut next = state.clone();
            let mut versions = Vec::with_capacity(writes.len());
            let mut events = Vec::new();

            for write in writes {
                let old_value = match next.entries.get(&write.key) {
                    Some(entry) if entry.value == write.value => {
                        versions.push(entry.version);
                        continue;
                    }
                    Some(entry) => Some(entry.value.clone()),
                    None => None,
                };

                next.revision += 1;
                let version = next.revision;
                next.entries.insert(
                    write.key.clone(),
                    Entry {
                        value: write.value.clone(),
                        version,
                    },
                );
                versions.push(version);
                events.push(StorageEvent {
                    key: write.key.clone(),
                    old_value,
                    new_value: Some(write.value.clone()),
                    version,
                    origin,
                });
            }

            if let Some(first) = events.first() {
                self.check_quota(&next, &first.key)?;
                self.persist(&next)?;
                *state = next;
            }

            (versions, events)
        };

        for event in &events {
            debug!(key = %event.key, version = event.version, origin = event.origin.as_u64(), "storage write");
        }
        self.feed.publish(&events);

        Ok(versions)
    }

    fn remove(&self, origin: ContextId, key: &str) -> Result<bool, StorageError> {
        let event = {
            let mut state = self
                .state
                .write()
                .map_err(|_| StorageError::LockPoisoned("remove"))?;

            if !state.entries.contains_key(key) {
                return Ok(false);
            }

            let mut next = state.clone();
            next.revision += 1;
            let old = next.entries.remove(key);
            self.persist(&next)?;
            let version = next.revision;
            *state = next;

            StorageEvent {
                key: key.to_string(),
                old_value: old.map(|entry| entry.value),
                new_value: None,
                version,
                origin,
            }
        };

        debug!(key, origin = origin.as_u64(), "storage remove");
        self.feed.publish(std::slice::from_ref(&event));
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::LockPoisoned("keys"))?;
        let mut keys: Vec<String> = state.entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn subscribe(&self, context: ContextId) -> Subscription {
        self.feed.subscribe(context)
    }
}
