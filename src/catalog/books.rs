use chrono::{Datelike, Utc};
use rand::Rng;
use tracing::{debug, info};

use super::{Catalog, Confirm};
use crate::error::{CatalogError, RecordKind, Result};
use crate::model::{
    defaults, describe, next_id, sanitize_cover, Book, BookStatus, BorrowRecord,
};
use crate::storage::{ContextId, KeyValueStore};

const DEFAULT_PUBLISHER: &str = "未知出版社";

/// Input for [`Catalog::add_book`]. Title, author and category are required;
/// everything else falls back to a default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub category: String,
    pub copies: Option<u32>,
    pub status: Option<BookStatus>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub cover: Option<String>,
}

impl NewBook {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = Some(copies);
        self
    }

    pub fn with_status(mut self, status: BookStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(cover.into());
        self
    }
}

/// Changes for [`Catalog::edit_book`]. Blank text, zero copies and `None`
/// leave the current value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub copies: Option<u32>,
    pub status: Option<BookStatus>,
}

fn required(value: &str, field: &'static str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(CatalogError::MissingField(field))
    } else {
        Ok(value.to_string())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Wrap a title in 《》 unless it already opens with a title mark or a quote.
fn format_title(title: &str) -> String {
    if title.starts_with('《') || title.starts_with('"') {
        title.to_string()
    } else {
        format!("《{}》", title)
    }
}

/// `978`, the last ten digits of the current millisecond timestamp and a
/// random number below 100.
fn generated_isbn() -> String {
    let millis = Utc::now().timestamp_millis().to_string();
    let tail = &millis[millis.len().saturating_sub(10)..];
    format!("978{}{}", tail, rand::thread_rng().gen_range(0..100))
}

impl<S: KeyValueStore + Clone> Catalog<S> {
    /// Add a new book with the next free id.
    pub fn add_book(&self, origin: ContextId, new_book: NewBook) -> Result<Book> {
        let title = format_title(&required(&new_book.title, "title")?);
        let author = required(&new_book.author, "author")?;
        let category = required(&new_book.category, "category")?;

        let mut books = self.load::<Book>(origin)?;

        let book = Book {
            id: next_id(&books.data),
            description: non_blank(new_book.description.as_deref())
                .unwrap_or_else(|| describe(&title)),
            title,
            author,
            category,
            status: new_book.status.unwrap_or_default(),
            copies: new_book.copies.filter(|copies| *copies > 0).unwrap_or(1),
            borrowed: 0,
            isbn: non_blank(new_book.isbn.as_deref()).unwrap_or_else(generated_isbn),
            publisher: non_blank(new_book.publisher.as_deref())
                .unwrap_or_else(|| DEFAULT_PUBLISHER.to_string()),
            year: new_book
                .year
                .filter(|year| *year != 0)
                .unwrap_or_else(|| Utc::now().year()),
            cover: sanitize_cover(new_book.cover.as_deref(), &self.config().placeholder_cover),
        };
        books.data.push(book.clone());

        let write = self.stage(&books.data, books.version)?;
        self.commit(origin, vec![write])?;

        info!(book_id = book.id, title = %book.title, "book added");
        Ok(book)
    }

    /// Apply a patch to a book. The status is taken as given and is not
    /// recomputed from the copy counts.
    pub fn edit_book(&self, origin: ContextId, book_id: u64, patch: BookPatch) -> Result<Book> {
        let mut books = self.load::<Book>(origin)?;

        let book = books
            .data
            .iter_mut()
            .find(|book| book.id == book_id)
            .ok_or(CatalogError::NotFound {
                kind: RecordKind::Book,
                id: book_id,
            })?;

        if let Some(title) = non_blank(patch.title.as_deref()) {
            book.title = title;
        }
        if let Some(author) = non_blank(patch.author.as_deref()) {
            book.author = author;
        }
        if let Some(copies) = patch.copies.filter(|copies| *copies > 0) {
            book.copies = copies;
        }
        if let Some(status) = patch.status {
            book.status = status;
        }
        let edited = book.clone();

        let write = self.stage(&books.data, books.version)?;
        self.commit(origin, vec![write])?;

        info!(book_id, "book edited");
        Ok(edited)
    }

    /// Delete a book together with every borrow record that references it.
    /// Returns the number of borrow records removed.
    pub fn delete_book(
        &self,
        origin: ContextId,
        book_id: u64,
        confirm: &dyn Confirm,
    ) -> Result<usize> {
        let mut books = self.load::<Book>(origin)?;
        let mut records = self.load::<BorrowRecord>(origin)?;

        let index = books
            .data
            .iter()
            .position(|book| book.id == book_id)
            .ok_or(CatalogError::NotFound {
                kind: RecordKind::Book,
                id: book_id,
            })?;

        let title = &books.data[index].title;
        let active = records
            .data
            .iter()
            .filter(|record| record.book_id == book_id && record.is_active())
            .count();
        let prompt = if active > 0 {
            format!(
                "{} has {} active loan(s); its borrow records will be deleted as well. Delete it? This cannot be undone.",
                title, active
            )
        } else {
            format!("Delete {}? This cannot be undone.", title)
        };
        if !confirm.confirm(&prompt) {
            return Err(CatalogError::Cancelled);
        }

        books.data.remove(index);
        let before = records.data.len();
        records.data.retain(|record| record.book_id != book_id);
        let removed = before - records.data.len();

        let mut writes = vec![self.stage(&books.data, books.version)?];
        if removed > 0 {
            writes.push(self.stage(&records.data, records.version)?);
        }
        self.commit(origin, writes)?;

        info!(book_id, removed_records = removed, "book deleted");
        Ok(removed)
    }

    /// Merge the featured demo books into the collection, skipping any whose
    /// title and author are already present. Returns how many were added.
    pub fn ensure_featured_books(&self, origin: ContextId) -> Result<usize> {
        let mut books = self.load::<Book>(origin)?;
        let placeholder = &self.config().placeholder_cover;

        let mut added = 0;
        for mut featured in defaults::featured_books() {
            let present = books
                .data
                .iter()
                .any(|book| book.title == featured.title && book.author == featured.author);
            if present {
                continue;
            }
            featured.id = next_id(&books.data);
            featured.cover = sanitize_cover(Some(&featured.cover), placeholder);
            books.data.push(featured);
            added += 1;
        }

        if added == 0 {
            debug!("featured books already present");
            return Ok(0);
        }

        let write = self.stage(&books.data, books.version)?;
        self.commit(origin, vec![write])?;

        info!(added, "featured books added");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Confirmed, Declined};
    use crate::config::CatalogConfig;
    use crate::model::BOOKS_KEY;
    use crate::storage::InMemoryStorage;
    use std::cell::RefCell;

    fn catalog() -> Catalog<InMemoryStorage> {
        Catalog::new(InMemoryStorage::new(), CatalogConfig::default())
    }

    #[test]
    fn add_book_fills_defaults() {
        let catalog = catalog();
        let origin = ContextId::next();

        let book = catalog
            .add_book(origin, NewBook::new(" Rust编程 ", "Ferris", "technology"))
            .unwrap();

        assert_eq!(book.id, 4);
        assert_eq!(book.title, "《Rust编程》");
        assert_eq!(book.copies, 1);
        assert_eq!(book.status, BookStatus::Available);
        assert_eq!(book.publisher, "未知出版社");
        assert_eq!(book.description, "《Rust编程》是一本值得阅读的好书。");
        assert_eq!(book.cover, "../img/a3.avif");
        assert!(book.isbn.starts_with("978"));
        assert!(book.isbn.len() >= 14);

        let books = catalog.load::<Book>(origin).unwrap();
        assert_eq!(books.data.len(), 4);
        assert_eq!(books.data[3], book);
    }

    #[test]
    fn add_book_keeps_given_values() {
        let catalog = catalog();
        let new_book = NewBook::new("\"Quoted\"", "A", "art")
            .with_copies(3)
            .with_status(BookStatus::Maintenance)
            .with_isbn("9780000000001")
            .with_publisher("Pub")
            .with_year(1999)
            .with_description("desc")
            .with_cover("https://example.com/c.png");

        let book = catalog.add_book(ContextId::next(), new_book).unwrap();

        assert_eq!(book.title, "\"Quoted\"");
        assert_eq!(book.copies, 3);
        assert_eq!(book.status, BookStatus::Maintenance);
        assert_eq!(book.isbn, "9780000000001");
        assert_eq!(book.year, 1999);
        assert_eq!(book.cover, "https://example.com/c.png");
    }

    #[test]
    fn add_book_requires_title_author_category() {
        let catalog = catalog();
        let origin = ContextId::next();

        assert_eq!(
            catalog.add_book(origin, NewBook::new("  ", "A", "art")).unwrap_err(),
            CatalogError::MissingField("title")
        );
        assert_eq!(
            catalog.add_book(origin, NewBook::new("T", "", "art")).unwrap_err(),
            CatalogError::MissingField("author")
        );
        assert_eq!(
            catalog.add_book(origin, NewBook::new("T", "A", "")).unwrap_err(),
            CatalogError::MissingField("category")
        );
        assert!(catalog.store().keys().unwrap().is_empty());
    }

    #[test]
    fn title_keeps_existing_marks() {
        assert_eq!(format_title("《三体》"), "《三体》");
        assert_eq!(format_title("三体"), "《三体》");
    }

    #[test]
    fn edit_ignores_blank_and_zero() {
        let catalog = catalog();
        let origin = ContextId::next();

        let patch = BookPatch {
            title: Some("   ".to_string()),
            author: Some("新作者".to_string()),
            copies: Some(0),
            status: None,
        };
        let book = catalog.edit_book(origin, 1, patch).unwrap();

        assert_eq!(book.title, "《Web开发指南》");
        assert_eq!(book.author, "新作者");
        assert_eq!(book.copies, 5);
        assert_eq!(book.status, BookStatus::Available);
    }

    #[test]
    fn edit_sets_status_without_recomputing() {
        let catalog = catalog();
        let patch = BookPatch {
            copies: Some(10),
            status: Some(BookStatus::Maintenance),
            ..BookPatch::default()
        };
        let book = catalog.edit_book(ContextId::next(), 2, patch).unwrap();

        assert_eq!(book.copies, 10);
        assert_eq!(book.borrowed, 3);
        assert_eq!(book.status, BookStatus::Maintenance);
    }

    #[test]
    fn edit_unknown_book() {
        let err = catalog()
            .edit_book(ContextId::next(), 42, BookPatch::default())
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::NotFound {
                kind: RecordKind::Book,
                id: 42
            }
        );
    }

    #[test]
    fn delete_cascades_to_borrow_records() {
        let catalog = catalog();
        let origin = ContextId::next();

        let removed = catalog.delete_book(origin, 2, &Confirmed).unwrap();
        assert_eq!(removed, 1);

        let snapshot = catalog.open(origin).unwrap();
        assert!(snapshot.find_book(2).is_none());
        assert!(snapshot.borrow_records.data.iter().all(|r| r.book_id != 2));
        assert_eq!(snapshot.borrow_records.data.len(), 2);
    }

    #[test]
    fn delete_prompt_mentions_active_loans() {
        let catalog = catalog();
        let origin = ContextId::next();
        let prompts = RefCell::new(Vec::new());
        let record = |prompt: &str| {
            prompts.borrow_mut().push(prompt.to_string());
            false
        };

        assert_eq!(
            catalog.delete_book(origin, 3, &record).unwrap_err(),
            CatalogError::Cancelled
        );
        assert_eq!(
            catalog.delete_book(origin, 1, &record).unwrap_err(),
            CatalogError::Cancelled
        );

        let prompts = prompts.into_inner();
        assert!(prompts[0].contains("1 active loan"));
        assert!(!prompts[1].contains("active loan"));
        assert_eq!(catalog.load::<Book>(origin).unwrap().data.len(), 3);
    }

    #[test]
    fn delete_declined_changes_nothing() {
        let catalog = catalog();
        let origin = ContextId::next();
        catalog.open(origin).unwrap();
        let version = catalog.store().version(BOOKS_KEY).unwrap();

        assert!(catalog.delete_book(origin, 1, &Declined).is_err());
        assert_eq!(catalog.store().version(BOOKS_KEY).unwrap(), version);
    }

    #[test]
    fn featured_books_merge_once() {
        let catalog = catalog();
        let origin = ContextId::next();
        catalog
            .store()
            .set_item(ContextId::EXTERNAL, BOOKS_KEY, "[]")
            .unwrap();

        assert_eq!(catalog.ensure_featured_books(origin).unwrap(), 3);
        assert_eq!(catalog.ensure_featured_books(origin).unwrap(), 0);

        let books = catalog.load::<Book>(origin).unwrap();
        let ids: Vec<u64> = books.data.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        // Seeded titles are repaired to their local cover on load.
        assert_eq!(books.data[0].cover, "../img/a3.avif");
    }

    #[test]
    fn featured_books_skip_seeded_titles() {
        assert_eq!(catalog().ensure_featured_books(ContextId::next()).unwrap(), 0);
    }
}
