//! Error types for the catalog store.

use std::fmt;

use thiserror::Error;

use crate::storage::StorageError;

/// Kind of record an operation looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Book,
    User,
    BorrowRecord,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Book => write!(f, "book"),
            RecordKind::User => write!(f, "user"),
            RecordKind::BorrowRecord => write!(f, "borrow record"),
        }
    }
}

/// Error type for catalog operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The underlying storage rejected a read or write.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Another context changed a collection between our read and our write.
    #[error("concurrent write on {key} (expected version {expected}, found {actual})")]
    ConcurrentWrite {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A required input field was blank.
    #[error("required field is missing: {0}")]
    MissingField(&'static str),

    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u64 },

    /// The book is not available or has no free copies.
    #[error("book {0} has no copies available")]
    Unavailable(u64),

    #[error("borrow record {0} is already returned")]
    AlreadyReturned(u64),

    /// No authenticated user in the view's session.
    #[error("login required")]
    NotAuthenticated,

    /// The session's role may not perform this operation.
    #[error("administrator role required")]
    Forbidden,

    #[error("user {0} is an administrator and cannot be deleted")]
    AdminProtected(u64),

    /// The confirmation prompt was declined.
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid username or password")]
    InvalidCredentials,

    /// A collection could not be serialized for storage.
    #[error("failed to encode {key}: {message}")]
    Encode { key: String, message: String },
}

/// Error type for loading a [`CatalogConfig`](crate::CatalogConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
