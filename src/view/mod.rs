//! Views - Independent readers and writers of the shared catalog.
//!
//! A [`CatalogView`] is what a page or tab is to a browser: it owns a session,
//! a snapshot of the three collections, a query and a current page. Views never
//! talk to each other directly. They notice each other's writes through the
//! storage change feed, the visibility/focus hooks, or the fallback poll, and
//! answer each of those by reloading and re-normalizing from storage.
//!
//! ## Example
//!
//! ```
//! use shared_catalog::catalog::Catalog;
//! use shared_catalog::storage::InMemoryStorage;
//! use shared_catalog::view::CatalogView;
//! use shared_catalog::CatalogConfig;
//!
//! let catalog = Catalog::new(InMemoryStorage::new(), CatalogConfig::default());
//! let mut browse = CatalogView::open(catalog.clone()).unwrap();
//! let mut manage = CatalogView::open(catalog).unwrap();
//!
//! manage.login("admin", "admin123", false).unwrap();
//! manage.edit_book(1, shared_catalog::catalog::BookPatch {
//!     copies: Some(9),
//!     ..Default::default()
//! }).unwrap();
//!
//! assert_eq!(browse.process_storage_events().unwrap(), 1);
//! assert_eq!(browse.snapshot().find_book(1).unwrap().copies, 9);
//! ```

mod worker;

use std::fmt;

use chrono::Utc;
#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;
use tracing::{debug, warn};

use crate::auth::{self, Principal, SessionState, SocialLogin, SocialLoginState, SocialPlatform};
use crate::catalog::{BookPatch, Catalog, CatalogSnapshot, Confirm, NewBook, UserPatch};
use crate::error::{CatalogError, Result};
use crate::model::{Book, BorrowRecord, User, CATALOG_KEYS};
use crate::query::{paginate, total_pages, BookQuery, Page};
use crate::storage::{ContextId, KeyValueStore, Subscription};

pub use worker::{SyncStats, SyncWorkerThread};

/// In-process event emitted after every successful mutation made by a view.
pub const BOOKS_UPDATED: &str = "booksUpdated";

/// What made a view reconcile with storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Visible,
    Focus,
    Poll,
    LocalChange,
    StorageEvent,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncTrigger::Visible => "visible",
            SyncTrigger::Focus => "focus",
            SyncTrigger::Poll => "poll",
            SyncTrigger::LocalChange => "local-change",
            SyncTrigger::StorageEvent => "storage-event",
        };
        f.write_str(name)
    }
}

/// One independent context over the shared catalog.
pub struct CatalogView<S> {
    id: ContextId,
    catalog: Catalog<S>,
    snapshot: CatalogSnapshot,
    query: BookQuery,
    page: usize,
    session: SessionState,
    subscription: Subscription,
    #[cfg(feature = "emitter")]
    emitter: EventEmitter,
    reloads: u64,
}

impl<S: KeyValueStore + Clone> CatalogView<S> {
    /// Open a new view with an empty session. The view subscribes to the
    /// change feed before its first load so no write in between is missed.
    pub fn open(catalog: Catalog<S>) -> Result<Self> {
        let id = ContextId::next();
        let subscription = catalog.store().subscribe(id);
        let snapshot = catalog.open(id)?;
        debug!(view = id.as_u64(), versions = ?snapshot.versions(), "view opened");

        Ok(Self {
            id,
            catalog,
            snapshot,
            query: BookQuery::default(),
            page: 1,
            session: SessionState::new(),
            subscription,
            #[cfg(feature = "emitter")]
            emitter: EventEmitter::new(),
            reloads: 0,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn catalog(&self) -> &Catalog<S> {
        &self.catalog
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn books(&self) -> &[Book] {
        &self.snapshot.books.data
    }

    pub fn users(&self) -> &[User] {
        &self.snapshot.users.data
    }

    pub fn borrow_records(&self) -> &[BorrowRecord] {
        &self.snapshot.borrow_records.data
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn principal(&self) -> Option<Principal> {
        self.session.principal()
    }

    /// Number of reloads since the view opened.
    pub fn reload_count(&self) -> u64 {
        self.reloads
    }

    // Sync

    /// Reload and re-normalize everything, resetting to the first page.
    pub fn reconcile(&mut self, trigger: SyncTrigger) -> Result<()> {
        self.snapshot = self.catalog.open(self.id)?;
        self.page = 1;
        self.reloads += 1;
        debug!(view = self.id.as_u64(), %trigger, versions = ?self.snapshot.versions(), "view reconciled");
        Ok(())
    }

    /// Fallback poll. Reloads only if a collection's stored version moved
    /// since the last load. Returns whether it reloaded.
    pub fn poll(&mut self) -> Result<bool> {
        let store = self.catalog.store();
        let current = [
            store.version(CATALOG_KEYS[0])?,
            store.version(CATALOG_KEYS[1])?,
            store.version(CATALOG_KEYS[2])?,
        ];
        if current == self.snapshot.versions() {
            return Ok(false);
        }
        self.reconcile(SyncTrigger::Poll)?;
        Ok(true)
    }

    /// Becoming visible reloads; becoming hidden does nothing.
    pub fn on_visibility_change(&mut self, visible: bool) -> Result<bool> {
        if !visible {
            return Ok(false);
        }
        self.reconcile(SyncTrigger::Visible)?;
        Ok(true)
    }

    pub fn on_focus(&mut self) -> Result<()> {
        self.reconcile(SyncTrigger::Focus)
    }

    /// Drain pending change notifications from other contexts and reload once
    /// if any of them touched a catalog collection. Returns the number of
    /// relevant notifications.
    pub fn process_storage_events(&mut self) -> Result<usize> {
        let relevant = self
            .subscription
            .drain()
            .iter()
            .filter(|event| CATALOG_KEYS.contains(&event.key.as_str()))
            .count();
        if relevant > 0 {
            self.reconcile(SyncTrigger::StorageEvent)?;
        }
        Ok(relevant)
    }

    // Browsing

    pub fn query(&self) -> &BookQuery {
        &self.query
    }

    /// Replace the query and go back to the first page.
    pub fn set_query(&mut self, query: BookQuery) {
        self.query = query;
        self.page = 1;
    }

    pub fn filtered(&self) -> Vec<&Book> {
        self.query.apply(self.books())
    }

    pub fn page(&self) -> Page<'_> {
        paginate(&self.filtered(), self.page, self.page_size())
    }

    pub fn go_to_page(&mut self, number: usize) -> usize {
        let last = total_pages(self.filtered().len(), self.page_size());
        self.page = number.clamp(1, last);
        self.page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to_page(self.page + 1)
    }

    pub fn prev_page(&mut self) -> usize {
        self.go_to_page(self.page.saturating_sub(1))
    }

    fn page_size(&self) -> usize {
        self.catalog.config().page_size
    }

    // Session

    pub fn login(&mut self, username: &str, password: &str, remember: bool) -> Result<Principal> {
        auth::login(
            &mut self.session,
            self.catalog.store(),
            self.id,
            username,
            password,
            remember,
        )
    }

    pub fn logout(&mut self) -> Result<()> {
        auth::logout(&mut self.session, self.catalog.store(), self.id)
    }

    /// Login remembered by any view, for prefilling a login form.
    pub fn remembered_login(&self) -> Result<Option<Principal>> {
        auth::remembered(self.catalog.store())
    }

    pub fn start_social_login(&self, platform: SocialPlatform) -> Result<SocialLogin> {
        SocialLogin::start(
            self.catalog.store(),
            self.id,
            platform,
            self.catalog.config().social_login_max_polls,
        )
    }

    pub fn poll_social_login(&mut self, login: &mut SocialLogin) -> Result<SocialLoginState> {
        login.poll(self.catalog.store(), self.id, &mut self.session)
    }

    fn require_admin(&self) -> Result<Principal> {
        let principal = self.principal().ok_or(CatalogError::NotAuthenticated)?;
        if !principal.is_admin() {
            return Err(CatalogError::Forbidden);
        }
        Ok(principal)
    }

    // Mutations

    /// Borrow a book for the logged-in user, dated today (UTC).
    pub fn borrow(&mut self, book_id: u64) -> Result<BorrowRecord> {
        let principal = self.principal().ok_or(CatalogError::NotAuthenticated)?;
        let today = Utc::now().date_naive();
        let record = self.catalog.borrow(self.id, &principal, book_id, today)?;
        self.after_mutation("borrow");
        Ok(record)
    }

    pub fn add_book(&mut self, new_book: NewBook) -> Result<Book> {
        self.require_admin()?;
        let book = self.catalog.add_book(self.id, new_book)?;
        self.after_mutation("add-book");
        Ok(book)
    }

    pub fn edit_book(&mut self, book_id: u64, patch: BookPatch) -> Result<Book> {
        self.require_admin()?;
        let book = self.catalog.edit_book(self.id, book_id, patch)?;
        self.after_mutation("edit-book");
        Ok(book)
    }

    pub fn delete_book(&mut self, book_id: u64, confirm: &dyn Confirm) -> Result<usize> {
        self.require_admin()?;
        let removed = self.catalog.delete_book(self.id, book_id, confirm)?;
        self.after_mutation("delete-book");
        Ok(removed)
    }

    pub fn mark_returned(&mut self, record_id: u64) -> Result<BorrowRecord> {
        self.require_admin()?;
        let record = self.catalog.mark_returned(self.id, record_id)?;
        self.after_mutation("mark-returned");
        Ok(record)
    }

    pub fn delete_borrow_record(
        &mut self,
        record_id: u64,
        confirm: &dyn Confirm,
    ) -> Result<BorrowRecord> {
        self.require_admin()?;
        let record = self.catalog.delete_borrow_record(self.id, record_id, confirm)?;
        self.after_mutation("delete-borrow-record");
        Ok(record)
    }

    pub fn edit_user(&mut self, user_id: u64, patch: UserPatch) -> Result<User> {
        self.require_admin()?;
        let user = self.catalog.edit_user(self.id, user_id, patch)?;
        self.after_mutation("edit-user");
        Ok(user)
    }

    pub fn delete_user(&mut self, user_id: u64, confirm: &dyn Confirm) -> Result<usize> {
        self.require_admin()?;
        let removed = self.catalog.delete_user(self.id, user_id, confirm)?;
        self.after_mutation("delete-user");
        Ok(removed)
    }

    /// Merge the featured books in, as the home page does on load.
    pub fn ensure_featured_books(&mut self) -> Result<usize> {
        let added = self.catalog.ensure_featured_books(self.id)?;
        if added > 0 {
            self.after_mutation("featured-books");
        }
        Ok(added)
    }

    /// Register a listener for [`BOOKS_UPDATED`]. The payload is a JSON object
    /// with the originating view, the action and the new versions.
    #[cfg(feature = "emitter")]
    pub fn on_books_updated<F>(&mut self, listener: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.emitter.on(BOOKS_UPDATED, listener);
    }

    /// The write has already landed, so a failed refresh is only logged; the
    /// next poll or storage event picks the change up.
    fn after_mutation(&mut self, action: &str) {
        if let Err(err) = self.reconcile(SyncTrigger::LocalChange) {
            warn!(view = self.id.as_u64(), action, error = %err, "refresh after mutation failed");
        }
        self.notify(action);
    }

    #[cfg(feature = "emitter")]
    fn notify(&mut self, action: &str) {
        let payload = serde_json::json!({
            "origin": self.id.as_u64(),
            "action": action,
            "versions": self.snapshot.versions(),
        });
        self.emitter.emit(BOOKS_UPDATED, payload.to_string());
    }

    #[cfg(not(feature = "emitter"))]
    fn notify(&mut self, action: &str) {
        debug!(view = self.id.as_u64(), action, "catalog updated");
    }
}
