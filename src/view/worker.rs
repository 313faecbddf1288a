//! Background sync for a shared view.
//!
//! The worker wakes up every poll interval, drains the view's change feed and
//! runs the fallback version poll. It is the only long-running unit in the
//! crate and stops on request or when its handle is dropped.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::CatalogView;
use crate::storage::KeyValueStore;

/// Statistics from the sync worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub ticks: usize,
    pub reloads: usize,
    pub errors: usize,
}

/// A background thread that keeps a shared [`CatalogView`] in sync.
///
/// ## Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
/// use shared_catalog::catalog::Catalog;
/// use shared_catalog::storage::InMemoryStorage;
/// use shared_catalog::view::{CatalogView, SyncWorkerThread};
/// use shared_catalog::CatalogConfig;
///
/// let catalog = Catalog::new(InMemoryStorage::new(), CatalogConfig::default());
/// let view = Arc::new(Mutex::new(CatalogView::open(catalog).unwrap()));
///
/// let worker = SyncWorkerThread::spawn(Arc::clone(&view), Duration::from_millis(10));
/// // ... other views write ...
/// let stats = worker.stop();
/// assert!(stats.ticks >= 1);
/// ```
pub struct SyncWorkerThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<SyncStats>>,
}

impl SyncWorkerThread {
    /// Spawn a worker for `view`, ticking every `poll_interval`.
    pub fn spawn<S>(view: Arc<Mutex<CatalogView<S>>>, poll_interval: Duration) -> Self
    where
        S: KeyValueStore + Clone + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = SyncStats::default();

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                stats.ticks += 1;

                match view.lock() {
                    Ok(mut view) => {
                        match view.process_storage_events() {
                            Ok(0) => {}
                            Ok(_) => stats.reloads += 1,
                            Err(err) => {
                                warn!(view = view.id().as_u64(), error = %err, "sync from change feed failed");
                                stats.errors += 1;
                            }
                        }
                        match view.poll() {
                            Ok(true) => stats.reloads += 1,
                            Ok(false) => {}
                            Err(err) => {
                                warn!(view = view.id().as_u64(), error = %err, "sync poll failed");
                                stats.errors += 1;
                            }
                        }
                    }
                    Err(_) => {
                        warn!("view lock poisoned, stopping sync worker");
                        stats.errors += 1;
                        break;
                    }
                }

                thread::sleep(poll_interval);
            }

            debug!(ticks = stats.ticks, reloads = stats.reloads, "sync worker stopped");
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Spawn a worker using the view's configured poll interval.
    pub fn spawn_configured<S>(view: Arc<Mutex<CatalogView<S>>>) -> Self
    where
        S: KeyValueStore + Clone + Send + 'static,
    {
        let interval = view
            .lock()
            .map(|view| view.catalog().config().poll_interval())
            .unwrap_or(Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS));
        Self::spawn(view, interval)
    }

    /// Signal the worker to stop and wait for it to finish.
    /// Returns the worker statistics.
    pub fn stop(mut self) -> SyncStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            SyncStats::default()
        }
    }

    /// Signal the worker to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for SyncWorkerThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::CatalogConfig;
    use crate::model::BOOKS_KEY;
    use crate::storage::{ContextId, InMemoryStorage};

    #[test]
    fn worker_picks_up_external_writes() {
        let catalog = Catalog::new(InMemoryStorage::new(), CatalogConfig::default());
        let view = Arc::new(Mutex::new(CatalogView::open(catalog.clone()).unwrap()));
        let worker = SyncWorkerThread::spawn(Arc::clone(&view), Duration::from_millis(5));

        catalog
            .store()
            .set_item(ContextId::EXTERNAL, BOOKS_KEY, "[]")
            .unwrap();
        thread::sleep(Duration::from_millis(100));

        let stats = worker.stop();
        assert!(stats.ticks > 1);
        assert!(stats.reloads >= 1);
        assert_eq!(stats.errors, 0);
        assert!(view.lock().unwrap().books().is_empty());
    }

    #[test]
    fn idle_worker_never_reloads() {
        let catalog = Catalog::new(InMemoryStorage::new(), CatalogConfig::default());
        let view = Arc::new(Mutex::new(CatalogView::open(catalog).unwrap()));
        let worker = SyncWorkerThread::spawn(Arc::clone(&view), Duration::from_millis(5));

        thread::sleep(Duration::from_millis(30));
        let stats = worker.stop();
        assert_eq!(stats.reloads, 0);
        assert_eq!(view.lock().unwrap().reload_count(), 0);
    }

    #[test]
    fn configured_interval() {
        let config = CatalogConfig::default().with_poll_interval(Duration::from_millis(5));
        let view = Arc::new(Mutex::new(
            CatalogView::open(Catalog::new(InMemoryStorage::new(), config)).unwrap(),
        ));
        let worker = SyncWorkerThread::spawn_configured(view);
        thread::sleep(Duration::from_millis(30));
        assert!(worker.stop().ticks > 1);
    }
}
