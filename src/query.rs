//! Filtering, sorting and pagination over a book list.
//!
//! Everything here is pure: the input slice is never modified and the same
//! query over the same books always yields the same result.
//!
//! ```
//! use shared_catalog::model::{Book, Record};
//! use shared_catalog::query::{BookQuery, SortKey};
//! use shared_catalog::CatalogConfig;
//!
//! let books = Book::defaults(&CatalogConfig::default());
//! let found = BookQuery::new()
//!     .with_category("technology")
//!     .with_search("高级")
//!     .apply(&books);
//!
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].author, "李华");
//!
//! let sorted = BookQuery::new().sorted_by(SortKey::Author).apply(&books);
//! assert_eq!(sorted.len(), 3);
//! ```

use std::cmp::Ordering;

use crate::model::{Book, BookStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Title,
    Author,
    /// Oldest first.
    Year,
    /// Newest first.
    YearDesc,
}

impl SortKey {
    fn compare(&self, a: &Book, b: &Book) -> Ordering {
        match self {
            SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortKey::Author => a.author.to_lowercase().cmp(&b.author.to_lowercase()),
            SortKey::Year => a.year.cmp(&b.year),
            SortKey::YearDesc => b.year.cmp(&a.year),
        }
    }
}

/// A filter plus an optional sort. Criteria combine with AND; unset criteria
/// match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookQuery {
    pub category: Option<String>,
    pub status: Option<BookStatus>,
    pub search: Option<String>,
    pub sort: Option<SortKey>,
}

impl BookQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_status(mut self, status: BookStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn sorted_by(mut self, key: SortKey) -> Self {
        self.sort = Some(key);
        self
    }

    /// Whether `book` passes every filter.
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(category) = &self.category {
            if &book.category != category {
                return false;
            }
        }
        if let Some(status) = self.status {
            if book.status != status {
                return false;
            }
        }
        match self.search_term() {
            Some(term) => search_matches(book, &term),
            None => true,
        }
    }

    /// Matching books, sorted if a sort key is set and otherwise in input
    /// order. Sorting is stable.
    pub fn apply<'a>(&self, books: &'a [Book]) -> Vec<&'a Book> {
        let mut matched: Vec<&Book> = books.iter().filter(|book| self.matches(book)).collect();
        if let Some(key) = self.sort {
            matched.sort_by(|a, b| key.compare(a, b));
        }
        matched
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
    }
}

fn search_matches(book: &Book, term: &str) -> bool {
    [&book.title, &book.author, &book.description, &book.publisher]
        .iter()
        .any(|field| field.to_lowercase().contains(term))
        || book.isbn.contains(term)
}

/// One page of a result list. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub items: Vec<&'a Book>,
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl Page<'_> {
    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.number > 1
    }
}

/// Number of pages needed for `total_items`; never less than one.
pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    total_items.div_ceil(page_size.max(1)).max(1)
}

/// Cut page `number` out of `items`, clamping the number into range.
pub fn paginate<'a>(items: &[&'a Book], number: usize, page_size: usize) -> Page<'a> {
    let page_size = page_size.max(1);
    let total_pages = total_pages(items.len(), page_size);
    let number = number.clamp(1, total_pages);
    let start = (number - 1) * page_size;

    Page {
        items: items.iter().skip(start).take(page_size).copied().collect(),
        number,
        total_pages,
        total_items: items.len(),
    }
}
