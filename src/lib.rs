//! A library catalog kept in shared key-value storage.
//!
//! Several independent views (pages, tabs, processes sharing a store) read and
//! write the same three collections: books, users and borrow records. Storage
//! is versioned and compare-and-swap capable, every load heals malformed data,
//! and views find out about each other's writes through a change feed with a
//! polling fallback.
//!
//! ```
//! use shared_catalog::{Catalog, CatalogConfig, CatalogView, InMemoryStorage};
//!
//! let catalog = Catalog::new(InMemoryStorage::new(), CatalogConfig::default());
//! let mut view = CatalogView::open(catalog).unwrap();
//!
//! view.login("user", "user123", false).unwrap();
//! let record = view.borrow(1).unwrap();
//! assert_eq!(record.status, shared_catalog::model::BorrowStatus::Borrowed);
//! ```

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod storage;
pub mod view;

pub use auth::{Principal, SessionState};
pub use catalog::{Catalog, CatalogSnapshot, Confirm};
pub use config::CatalogConfig;
pub use error::{CatalogError, ConfigError, RecordKind, Result};
pub use model::{Book, BookStatus, BorrowRecord, BorrowStatus, Role, User, Versioned};
pub use query::{BookQuery, Page, SortKey};
#[cfg(feature = "file")]
pub use storage::FileStorage;
pub use storage::{ContextId, InMemoryStorage, KeyValueStore, StorageError, StorageEvent};
pub use view::{CatalogView, SyncStats, SyncTrigger, SyncWorkerThread};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
