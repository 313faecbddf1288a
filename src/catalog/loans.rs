use chrono::{Days, NaiveDate};
use tracing::info;

use super::{Catalog, Confirm};
use crate::auth::Principal;
use crate::error::{CatalogError, RecordKind, Result};
use crate::model::{next_id, Book, BookStatus, BorrowRecord, BorrowStatus, User};
use crate::storage::{ContextId, KeyValueStore};

impl<S: KeyValueStore + Clone> Catalog<S> {
    /// Lend one copy of `book_id` to `principal`, due after the configured
    /// loan period.
    ///
    /// The book must be `available` with at least one free copy. When the
    /// last copy goes out the book's status flips to `borrowed`.
    pub fn borrow(
        &self,
        origin: ContextId,
        principal: &Principal,
        book_id: u64,
        today: NaiveDate,
    ) -> Result<BorrowRecord> {
        let mut books = self.load::<Book>(origin)?;
        let mut records = self.load::<BorrowRecord>(origin)?;
        let users = self.load::<User>(origin)?;

        let book = books
            .data
            .iter_mut()
            .find(|book| book.id == book_id)
            .ok_or(CatalogError::NotFound {
                kind: RecordKind::Book,
                id: book_id,
            })?;
        if !book.is_borrowable() {
            return Err(CatalogError::Unavailable(book_id));
        }

        book.borrowed = book.borrowed.saturating_add(1);
        if book.borrowed >= book.copies {
            book.status = BookStatus::Borrowed;
        }
        let book_title = book.title.clone();

        let due_date = today
            .checked_add_days(Days::new(u64::from(self.config().loan_period_days)))
            .unwrap_or(NaiveDate::MAX);
        let record = BorrowRecord {
            id: next_id(&records.data),
            user_id: users
                .data
                .iter()
                .find(|user| user.name == principal.name)
                .map_or(0, |user| user.id),
            user_name: principal.name.clone(),
            user_role: Some(principal.role),
            book_id,
            book_title,
            borrow_date: today,
            due_date,
            status: BorrowStatus::Borrowed,
        };
        records.data.push(record.clone());

        let writes = vec![
            self.stage(&books.data, books.version)?,
            self.stage(&records.data, records.version)?,
        ];
        self.commit(origin, writes)?;

        info!(record_id = record.id, book_id, user = %principal.name, due = %record.due_date, "book borrowed");
        Ok(record)
    }

    /// Close a loan and give the copy back to its book, if the book still
    /// exists.
    pub fn mark_returned(&self, origin: ContextId, record_id: u64) -> Result<BorrowRecord> {
        let mut records = self.load::<BorrowRecord>(origin)?;
        let mut books = self.load::<Book>(origin)?;

        let record = records
            .data
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or(CatalogError::NotFound {
                kind: RecordKind::BorrowRecord,
                id: record_id,
            })?;
        if !record.is_active() {
            return Err(CatalogError::AlreadyReturned(record_id));
        }
        record.status = BorrowStatus::Returned;
        let returned = record.clone();

        let mut writes = vec![self.stage(&records.data, records.version)?];
        if let Some(book) = books.data.iter_mut().find(|book| book.id == returned.book_id) {
            book.borrowed = book.borrowed.saturating_sub(1);
            if book.available_copies() > 0 {
                book.status = BookStatus::Available;
            }
            writes.push(self.stage(&books.data, books.version)?);
        }
        self.commit(origin, writes)?;

        info!(record_id, book_id = returned.book_id, "book returned");
        Ok(returned)
    }

    /// Remove a borrow record. Book counts are left as they are.
    pub fn delete_borrow_record(
        &self,
        origin: ContextId,
        record_id: u64,
        confirm: &dyn Confirm,
    ) -> Result<BorrowRecord> {
        let mut records = self.load::<BorrowRecord>(origin)?;

        let index = records
            .data
            .iter()
            .position(|record| record.id == record_id)
            .ok_or(CatalogError::NotFound {
                kind: RecordKind::BorrowRecord,
                id: record_id,
            })?;
        if !confirm.confirm("Delete this borrow record? This cannot be undone.") {
            return Err(CatalogError::Cancelled);
        }

        let removed = records.data.remove(index);
        let write = self.stage(&records.data, records.version)?;
        self.commit(origin, vec![write])?;

        info!(record_id, "borrow record deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Confirmed, Declined};
    use crate::config::CatalogConfig;
    use crate::model::{Role, BOOKS_KEY};
    use crate::storage::InMemoryStorage;
    use serde_json::json;

    fn catalog() -> Catalog<InMemoryStorage> {
        Catalog::new(InMemoryStorage::new(), CatalogConfig::default())
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn reader() -> Principal {
        Principal::new("user", Role::User)
    }

    fn single_copy_book(catalog: &Catalog<InMemoryStorage>) {
        let raw = json!([{
            "id": 1, "title": "《Rust》", "author": "A", "category": "technology",
            "status": "available", "copies": 1, "borrowed": 0
        }]);
        catalog
            .store()
            .set_item(ContextId::EXTERNAL, BOOKS_KEY, &raw.to_string())
            .unwrap();
    }

    #[test]
    fn borrowing_last_copy_flips_status() {
        let catalog = catalog();
        single_copy_book(&catalog);
        let origin = ContextId::next();

        let record = catalog.borrow(origin, &reader(), 1, day(2025, 3, 1)).unwrap();

        assert_eq!(record.id, 1004);
        assert_eq!(record.due_date, day(2025, 3, 31));
        assert_eq!(record.book_title, "《Rust》");
        assert_eq!(record.user_role, Some(Role::User));
        assert_eq!(record.user_id, 0);

        let book = &catalog.load::<Book>(origin).unwrap().data[0];
        assert_eq!(book.borrowed, 1);
        assert_eq!(book.status, BookStatus::Borrowed);

        let err = catalog.borrow(origin, &reader(), 1, day(2025, 3, 1)).unwrap_err();
        assert_eq!(err, CatalogError::Unavailable(1));
    }

    #[test]
    fn borrowing_with_copies_left_keeps_available() {
        let catalog = catalog();
        let origin = ContextId::next();

        catalog.borrow(origin, &reader(), 3, day(2025, 1, 1)).unwrap();

        let books = catalog.load::<Book>(origin).unwrap();
        let book = books.data.iter().find(|b| b.id == 3).unwrap();
        assert_eq!(book.borrowed, 2);
        assert_eq!(book.status, BookStatus::Available);
    }

    #[test]
    fn borrow_unknown_or_unavailable_book() {
        let catalog = catalog();
        let origin = ContextId::next();

        assert_eq!(
            catalog.borrow(origin, &reader(), 99, day(2025, 1, 1)).unwrap_err(),
            CatalogError::NotFound {
                kind: RecordKind::Book,
                id: 99
            }
        );
        // Book 2 is seeded with every copy out.
        assert_eq!(
            catalog.borrow(origin, &reader(), 2, day(2025, 1, 1)).unwrap_err(),
            CatalogError::Unavailable(2)
        );
    }

    #[test]
    fn borrower_id_comes_from_user_list() {
        let catalog = catalog();
        let member = Principal::new("姜勇", Role::User);

        let record = catalog
            .borrow(ContextId::next(), &member, 1, day(2025, 1, 1))
            .unwrap();
        assert_eq!(record.user_id, 3);
    }

    #[test]
    fn returning_restores_availability() {
        let catalog = catalog();
        let origin = ContextId::next();

        // Record 1001 holds one of book 2's three borrowed copies.
        let returned = catalog.mark_returned(origin, 1001).unwrap();
        assert_eq!(returned.status, BorrowStatus::Returned);

        let books = catalog.load::<Book>(origin).unwrap();
        let book = books.data.iter().find(|b| b.id == 2).unwrap();
        assert_eq!(book.borrowed, 2);
        assert_eq!(book.status, BookStatus::Available);

        assert_eq!(
            catalog.mark_returned(origin, 1001).unwrap_err(),
            CatalogError::AlreadyReturned(1001)
        );
    }

    #[test]
    fn returning_never_goes_below_zero() {
        let catalog = catalog();
        single_copy_book(&catalog);
        let origin = ContextId::next();
        let record = catalog.borrow(origin, &reader(), 1, day(2025, 1, 1)).unwrap();

        let raw = json!([{ "id": 1, "title": "《Rust》", "copies": 1, "borrowed": 0, "status": "borrowed" }]);
        catalog
            .store()
            .set_item(ContextId::EXTERNAL, BOOKS_KEY, &raw.to_string())
            .unwrap();

        catalog.mark_returned(origin, record.id).unwrap();
        let book = &catalog.load::<Book>(origin).unwrap().data[0];
        assert_eq!(book.borrowed, 0);
        assert_eq!(book.status, BookStatus::Available);
    }

    #[test]
    fn returning_after_book_deleted() {
        let catalog = catalog();
        let origin = ContextId::next();
        catalog
            .store()
            .set_item(ContextId::EXTERNAL, BOOKS_KEY, "[]")
            .unwrap();

        let returned = catalog.mark_returned(origin, 1003).unwrap();
        assert_eq!(returned.book_id, 3);
        assert!(catalog.load::<Book>(origin).unwrap().data.is_empty());
    }

    #[test]
    fn deleting_a_record_needs_confirmation() {
        let catalog = catalog();
        let origin = ContextId::next();

        assert_eq!(
            catalog.delete_borrow_record(origin, 1002, &Declined).unwrap_err(),
            CatalogError::Cancelled
        );
        assert_eq!(catalog.load::<BorrowRecord>(origin).unwrap().data.len(), 3);

        let removed = catalog.delete_borrow_record(origin, 1002, &Confirmed).unwrap();
        assert_eq!(removed.id, 1002);
        assert_eq!(catalog.load::<BorrowRecord>(origin).unwrap().data.len(), 2);

        // Book counts are untouched.
        let books = catalog.load::<Book>(origin).unwrap();
        assert_eq!(books.data.iter().find(|b| b.id == 1).unwrap().borrowed, 0);
    }
}
