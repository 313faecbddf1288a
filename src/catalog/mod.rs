//! Catalog - Normalized access to the shared collections.
//!
//! A [`Catalog`] wraps a [`KeyValueStore`] and is the only place that turns
//! stored JSON into records and back. Every load normalizes what it finds and
//! writes the healed form back when it differs from what is stored, so a
//! malformed or hand-edited collection is repaired by whichever view reads it
//! first.
//!
//! Mutations follow one pattern: load fresh state, check, mutate, then write
//! every touched collection in one compare-and-swap batch. If another context
//! wrote in between, the batch is rejected with
//! [`CatalogError::ConcurrentWrite`] and nothing is changed.

mod books;
mod confirm;
mod loans;
mod users;

use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::model::{Book, BorrowRecord, NormalizeContext, Record, User, Versioned};
use crate::storage::{ContextId, KeyValueStore, StorageError, Write};

pub use books::{BookPatch, NewBook};
pub use confirm::{Confirm, Confirmed, Declined};
pub use users::UserPatch;

/// Attempts at writing back a healed collection before giving up to a
/// concurrent writer.
const MAX_HEAL_ATTEMPTS: usize = 3;

/// All three collections as read at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub books: Versioned<Vec<Book>>,
    pub users: Versioned<Vec<User>>,
    pub borrow_records: Versioned<Vec<BorrowRecord>>,
}

impl CatalogSnapshot {
    pub fn find_book(&self, id: u64) -> Option<&Book> {
        self.books.data.iter().find(|book| book.id == id)
    }

    /// Versions of books, users and borrow records, in that order.
    pub fn versions(&self) -> [u64; 3] {
        [
            self.books.version,
            self.users.version,
            self.borrow_records.version,
        ]
    }
}

/// Normalized, versioned access to the catalog collections in a store.
#[derive(Clone)]
pub struct Catalog<S> {
    store: S,
    config: Arc<CatalogConfig>,
}

impl<S: KeyValueStore + Clone> Catalog<S> {
    pub fn new(store: S, config: CatalogConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn normalize_context(&self) -> NormalizeContext {
        let today = Utc::now().date_naive();
        NormalizeContext::new(today.year(), self.config.placeholder_cover.clone())
            .with_today(today)
            .with_loan_period_days(self.config.loan_period_days)
            .with_repair_seed_books(self.config.repair_seed_books)
    }

    /// Load and heal all three collections.
    pub fn open(&self, origin: ContextId) -> Result<CatalogSnapshot> {
        Ok(CatalogSnapshot {
            books: self.load(origin)?,
            users: self.load(origin)?,
            borrow_records: self.load(origin)?,
        })
    }

    /// Load one collection, normalizing it and writing the healed form back if
    /// it differs from the stored value.
    ///
    /// A missing or malformed collection is replaced by the seed data (or an
    /// empty list when seeding is off). If the write-back fails for any reason
    /// other than a concurrent change, the normalized data is still returned
    /// at the old version.
    pub fn load<R: Record>(&self, origin: ContextId) -> Result<Versioned<Vec<R>>> {
        let ctx = self.normalize_context();
        let mut last_conflict = None;

        for _ in 0..MAX_HEAL_ATTEMPTS {
            let entry = self.store.read(R::COLLECTION)?;
            let version = entry.as_ref().map_or(0, |entry| entry.version);
            let stored = entry.as_ref().map(|entry| entry.value.as_str());

            let records = self.decode::<R>(stored, &ctx);
            if stored.is_none() && records.is_empty() {
                return Ok(Versioned { data: records, version });
            }

            let encoded = encode(R::COLLECTION, &records)?;
            if stored == Some(encoded.as_str()) {
                return Ok(Versioned { data: records, version });
            }

            let heal = Write::put(R::COLLECTION, encoded).expecting(version);
            match self.store.write_all(origin, &[heal]) {
                Ok(versions) => {
                    let version = versions.first().copied().unwrap_or(version);
                    debug!(collection = R::COLLECTION, version, "healed collection");
                    return Ok(Versioned { data: records, version });
                }
                Err(StorageError::Conflict {
                    key,
                    expected,
                    actual,
                }) => {
                    debug!(collection = R::COLLECTION, expected, actual, "collection changed while healing, retrying");
                    last_conflict = Some(CatalogError::ConcurrentWrite {
                        key,
                        expected,
                        actual,
                    });
                }
                Err(err) => {
                    warn!(collection = R::COLLECTION, error = %err, "failed to write back normalized collection");
                    return Ok(Versioned { data: records, version });
                }
            }
        }

        Err(last_conflict.unwrap_or(CatalogError::ConcurrentWrite {
            key: R::COLLECTION.to_string(),
            expected: 0,
            actual: 0,
        }))
    }

    fn decode<R: Record>(&self, stored: Option<&str>, ctx: &NormalizeContext) -> Vec<R> {
        let raw = stored.and_then(|text| match serde_json::from_str::<Vec<Value>>(text) {
            Ok(values) => Some(values),
            Err(err) => {
                warn!(collection = R::COLLECTION, error = %err, "stored collection is malformed, reseeding");
                None
            }
        });

        match raw {
            Some(values) => R::normalize_all(&values, ctx),
            None if self.config.seed_defaults => R::defaults(&self.config),
            None => Vec::new(),
        }
    }

    /// Encode a collection into a write that only applies at `expected`.
    pub(crate) fn stage<R: Record>(&self, records: &[R], expected: u64) -> Result<Write> {
        Ok(Write::put(R::COLLECTION, encode(R::COLLECTION, records)?).expecting(expected))
    }

    /// Apply a batch of staged writes atomically.
    pub(crate) fn commit(&self, origin: ContextId, writes: Vec<Write>) -> Result<Vec<u64>> {
        self.store
            .write_all(origin, &writes)
            .map_err(|err| match err {
                StorageError::Conflict {
                    key,
                    expected,
                    actual,
                } => CatalogError::ConcurrentWrite {
                    key,
                    expected,
                    actual,
                },
                other => CatalogError::Storage(other),
            })
    }
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CatalogError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })
}
