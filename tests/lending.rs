mod support;

use chrono::NaiveDate;
use shared_catalog::catalog::{Confirmed, NewBook};
use shared_catalog::model::{Record, BOOKS_KEY, BORROW_RECORDS_KEY};
use shared_catalog::{
    Book, BookStatus, BorrowStatus, Catalog, CatalogConfig, CatalogError, ContextId,
    InMemoryStorage, KeyValueStore, Principal, Role, StorageError,
};
use support::{admin_view, catalog, reader_view, single_copy_books};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn single_copy_loan_lifecycle() {
    let catalog = catalog();
    catalog
        .store()
        .set_item(ContextId::EXTERNAL, BOOKS_KEY, &single_copy_books())
        .unwrap();
    let origin = ContextId::next();
    let reader = Principal::new("user", Role::User);

    let record = catalog.borrow(origin, &reader, 1, day(2025, 6, 1)).unwrap();
    assert_eq!(record.borrow_date, day(2025, 6, 1));
    assert_eq!(record.due_date, day(2025, 7, 1));
    assert_eq!(record.status, BorrowStatus::Borrowed);

    let book = catalog.load::<Book>(origin).unwrap().data.remove(0);
    assert_eq!((book.borrowed, book.status), (1, BookStatus::Borrowed));

    catalog.mark_returned(origin, record.id).unwrap();
    let book = catalog.load::<Book>(origin).unwrap().data.remove(0);
    assert_eq!((book.borrowed, book.status), (0, BookStatus::Available));

    assert_eq!(
        catalog.mark_returned(origin, record.id).unwrap_err(),
        CatalogError::AlreadyReturned(record.id)
    );
}

#[test]
fn second_view_cannot_borrow_the_last_copy() {
    let catalog = catalog();
    catalog
        .store()
        .set_item(ContextId::EXTERNAL, BOOKS_KEY, &single_copy_books())
        .unwrap();

    let mut first = reader_view(&catalog);
    let mut second = reader_view(&catalog);

    // Both views show the book as available before either borrows.
    assert!(first.snapshot().find_book(1).unwrap().is_borrowable());
    assert!(second.snapshot().find_book(1).unwrap().is_borrowable());

    first.borrow(1).unwrap();
    assert_eq!(second.borrow(1).unwrap_err(), CatalogError::Unavailable(1));

    let records = catalog.load::<shared_catalog::BorrowRecord>(ContextId::next()).unwrap();
    assert_eq!(records.data.iter().filter(|r| r.book_id == 1).count(), 1);
}

#[test]
fn concurrent_borrows_of_last_copy_allow_one() {
    let catalog = catalog();
    catalog
        .store()
        .set_item(ContextId::EXTERNAL, BOOKS_KEY, &single_copy_books())
        .unwrap();
    catalog.open(ContextId::EXTERNAL).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let catalog = catalog.clone();
            std::thread::spawn(move || {
                let reader = Principal::new(format!("reader-{}", n), Role::User);
                catalog.borrow(ContextId::next(), &reader, 1, day(2025, 1, 1))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            err,
            CatalogError::Unavailable(1) | CatalogError::ConcurrentWrite { .. }
        ));
    }

    let book = catalog.load::<Book>(ContextId::next()).unwrap().data.remove(0);
    assert_eq!(book.borrowed, 1);
}

#[test]
fn deleting_a_book_removes_its_loans_everywhere() {
    let catalog = catalog();
    let mut manage = admin_view(&catalog);
    let mut browse = reader_view(&catalog);

    browse.borrow(3).unwrap();
    manage.process_storage_events().unwrap();
    assert_eq!(
        manage.borrow_records().iter().filter(|r| r.book_id == 3).count(),
        2
    );

    assert_eq!(manage.delete_book(3, &Confirmed).unwrap(), 2);

    browse.process_storage_events().unwrap();
    assert!(browse.snapshot().find_book(3).is_none());
    assert!(browse.borrow_records().iter().all(|r| r.book_id != 3));
}

#[test]
fn empty_storage_seeds_three_books() {
    let catalog = catalog();
    let snapshot = catalog.open(ContextId::next()).unwrap();
    assert_eq!(snapshot.books.data.len(), 3);
    assert_eq!(
        snapshot.books.data,
        Book::defaults(catalog.config())
    );
}

#[test]
fn full_storage_abandons_the_mutation() {
    // Room for exactly the seeded collections.
    let seeded = InMemoryStorage::new();
    Catalog::new(seeded.clone(), CatalogConfig::default())
        .open(ContextId::next())
        .unwrap();
    let store = InMemoryStorage::with_quota(seeded.usage().unwrap());
    let catalog = Catalog::new(store.clone(), CatalogConfig::default());

    let mut view = reader_view(&catalog);
    let before: Vec<_> = [BOOKS_KEY, BORROW_RECORDS_KEY]
        .iter()
        .map(|key| store.read(key).unwrap().unwrap())
        .collect();

    #[cfg(feature = "emitter")]
    let notified = {
        let notified = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = notified.clone();
        view.on_books_updated(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        notified
    };

    let err = view.borrow(1).unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Storage(StorageError::QuotaExceeded { .. })
    ));

    view.logout().unwrap();
    view.login("admin", "admin123", false).unwrap();
    let err = view
        .add_book(NewBook::new("装不下", "作者", "technology"))
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Storage(StorageError::QuotaExceeded { .. })
    ));

    let after: Vec<_> = [BOOKS_KEY, BORROW_RECORDS_KEY]
        .iter()
        .map(|key| store.read(key).unwrap().unwrap())
        .collect();
    assert_eq!(after, before);
    assert_eq!(view.books().len(), 3);
    assert_eq!(view.snapshot().find_book(1).unwrap().borrowed, 0);

    #[cfg(feature = "emitter")]
    {
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
