//! Records - Typed catalog collections stored as JSON arrays.
//!
//! Each collection lives under one storage key and is always read and
//! written whole. Decoding is lenient: stored data may come from older or
//! hand-edited versions, so every collection knows how to turn raw JSON
//! entries into well-formed records.
//!
//! ## Example
//!
//! ```
//! use shared_catalog::model::{Book, NormalizeContext, Record};
//! use serde_json::json;
//!
//! let ctx = NormalizeContext::new(2025, "../img/a3.avif");
//! let books = Book::normalize_all(&[json!({ "id": 7, "title": "《Rust》" })], &ctx);
//!
//! assert_eq!(books[0].author, "未知作者");
//! assert_eq!(books[0].description, "《Rust》是一本值得阅读的好书。");
//! ```

mod book;
mod borrow;
pub(crate) mod defaults;
mod user;

use chrono::{Days, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::CatalogConfig;

pub(crate) use book::describe;
pub use book::{sanitize_cover, Book, BookStatus};
pub use borrow::{BorrowRecord, BorrowStatus};
pub use user::{Role, User};

/// Storage key of the book collection.
pub const BOOKS_KEY: &str = "library_books";
/// Storage key of the user collection.
pub const USERS_KEY: &str = "library_users";
/// Storage key of the borrow record collection.
pub const BORROW_RECORDS_KEY: &str = "borrow_records";

/// Keys whose changes require a view to reconcile.
pub const CATALOG_KEYS: [&str; 3] = [BOOKS_KEY, USERS_KEY, BORROW_RECORDS_KEY];

/// Trait for types stored as a whole-collection JSON array.
pub trait Record: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    /// Storage key of the collection.
    const COLLECTION: &'static str;

    /// First id handed out when the collection is empty.
    const FIRST_ID: u64 = 1;

    fn id(&self) -> u64;

    /// Records seeded when the collection is missing or malformed.
    fn defaults(config: &CatalogConfig) -> Vec<Self>;

    /// Turn raw stored entries into records, filling every missing or
    /// unreadable field with a default. Must be idempotent: normalizing the
    /// encoded output again yields the same records.
    fn normalize_all(raw: &[Value], ctx: &NormalizeContext) -> Vec<Self>;
}

/// A versioned wrapper around collection data for optimistic concurrency control.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

/// Inputs to normalization that are not part of the stored data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeContext {
    pub current_year: i32,
    pub placeholder_cover: String,
    /// Stands in for loan dates that cannot be read.
    pub today: NaiveDate,
    pub loan_period_days: u32,
    /// Restore author and cover of the seeded titles.
    pub repair_seed_books: bool,
}

impl NormalizeContext {
    pub fn new(current_year: i32, placeholder_cover: impl Into<String>) -> Self {
        Self {
            current_year,
            placeholder_cover: placeholder_cover.into(),
            today: Utc::now().date_naive(),
            loan_period_days: crate::config::DEFAULT_LOAN_PERIOD_DAYS,
            repair_seed_books: true,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_loan_period_days(mut self, days: u32) -> Self {
        self.loan_period_days = days;
        self
    }

    pub fn with_repair_seed_books(mut self, repair: bool) -> Self {
        self.repair_seed_books = repair;
        self
    }

    /// Due date of a loan taken on `borrowed`.
    pub(crate) fn due_date(&self, borrowed: NaiveDate) -> NaiveDate {
        borrowed
            .checked_add_days(Days::new(u64::from(self.loan_period_days)))
            .unwrap_or(borrowed)
    }
}

/// Next id after the largest one in `records`, or `R::FIRST_ID`.
pub fn next_id<R: Record>(records: &[R]) -> u64 {
    records
        .iter()
        .map(Record::id)
        .max()
        .map_or(R::FIRST_ID, |max| max + 1)
}

/// Stored entries that are JSON objects. Anything else carries no fields to
/// recover and is skipped with a warning.
pub(crate) fn objects<'a>(
    collection: &'static str,
    raw: &'a [Value],
) -> impl Iterator<Item = &'a Map<String, Value>> + 'a {
    raw.iter().filter_map(move |value| match value.as_object() {
        Some(object) => Some(object),
        None => {
            warn!(collection, entry = %value, "skipping stored entry that is not an object");
            None
        }
    })
}

/// Resolve stored ids, numbering entries without a usable one after the
/// largest id present (or from `first`).
pub(crate) fn fill_ids(ids: Vec<Option<u64>>, first: u64) -> Vec<u64> {
    let mut next = ids.iter().flatten().max().map_or(first, |max| max + 1);
    ids.into_iter()
        .map(|id| {
            id.unwrap_or_else(|| {
                let id = next;
                next += 1;
                id
            })
        })
        .collect()
}

/// `YYYY-MM-DD`, optionally followed by a time part as in ISO timestamps.
pub(crate) fn date_field(value: Option<&Value>) -> Option<NaiveDate> {
    let text = value?.as_str()?.trim();
    let date = text.split('T').next().unwrap_or(text);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

// Lenient field readers. Empty strings, zero and null count as missing, the
// same way the stored data was produced.

pub(crate) fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn number_field(value: Option<&Value>) -> Option<i64> {
    let number = match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64),
        _ => None,
    }?;
    Some(number)
}

pub(crate) fn count_field(value: Option<&Value>) -> Option<u32> {
    number_field(value).map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
}

pub(crate) fn id_field(value: Option<&Value>) -> Option<u64> {
    number_field(value)
        .filter(|n| *n > 0)
        .and_then(|n| u64::try_from(n).ok())
}
