#![allow(dead_code)]

use std::sync::Once;

use shared_catalog::{Catalog, CatalogConfig, CatalogView, InMemoryStorage};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber once; `RUST_LOG=shared_catalog=debug` shows the
/// sync traffic.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn catalog() -> Catalog<InMemoryStorage> {
    init_tracing();
    Catalog::new(InMemoryStorage::new(), CatalogConfig::default())
}

pub fn admin_view(catalog: &Catalog<InMemoryStorage>) -> CatalogView<InMemoryStorage> {
    let mut view = CatalogView::open(catalog.clone()).unwrap();
    view.login("admin", "admin123", false).unwrap();
    view
}

pub fn reader_view(catalog: &Catalog<InMemoryStorage>) -> CatalogView<InMemoryStorage> {
    let mut view = CatalogView::open(catalog.clone()).unwrap();
    view.login("user", "user123", false).unwrap();
    view
}

/// A collection holding one single-copy book with id 1.
pub fn single_copy_books() -> String {
    serde_json::json!([{
        "id": 1, "title": "《孤本》", "author": "佚名", "category": "literature",
        "status": "available", "copies": 1, "borrowed": 0
    }])
    .to_string()
}
