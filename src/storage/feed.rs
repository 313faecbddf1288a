//! Change feed fan-out.
//!
//! Each subscriber owns a channel receiver and drains it at its own pace.
//! Events are fanned out to every subscriber except the context that made the
//! change; subscribers whose receiver was dropped are pruned on the next publish.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{ContextId, StorageEvent};

#[derive(Default)]
pub(crate) struct ChangeFeed {
    subscribers: Mutex<Vec<(ContextId, Sender<StorageEvent>)>>,
}

impl ChangeFeed {
    pub(crate) fn subscribe(&self, context: ContextId) -> Subscription {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((context, tx));
        Subscription {
            context,
            events: rx,
        }
    }

    pub(crate) fn publish(&self, events: &[StorageEvent]) {
        if events.is_empty() {
            return;
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        subscribers.retain(|(context, tx)| {
            events
                .iter()
                .filter(|event| event.origin != *context)
                .all(|event| tx.send(event.clone()).is_ok())
        });
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Receiving end of a storage change feed.
pub struct Subscription {
    context: ContextId,
    events: Receiver<StorageEvent>,
}

impl Subscription {
    /// The context this subscription belongs to.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Next pending event, if any.
    pub fn try_next(&self) -> Option<StorageEvent> {
        self.events.try_recv().ok()
    }

    /// All pending events, oldest first.
    pub fn drain(&self) -> Vec<StorageEvent> {
        self.events.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<StorageEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(origin: ContextId, version: u64) -> StorageEvent {
        StorageEvent {
            key: "library_books".into(),
            old_value: None,
            new_value: Some("[]".into()),
            version,
            origin,
        }
    }

    #[test]
    fn skips_origin() {
        let feed = ChangeFeed::default();
        let writer = ContextId::next();
        let reader = ContextId::next();
        let own = feed.subscribe(writer);
        let other = feed.subscribe(reader);

        feed.publish(&[event(writer, 1)]);

        assert!(own.try_next().is_none());
        assert_eq!(other.drain(), vec![event(writer, 1)]);
    }

    #[test]
    fn prunes_dropped_subscribers() {
        let feed = ChangeFeed::default();
        let kept = feed.subscribe(ContextId::next());
        drop(feed.subscribe(ContextId::next()));
        assert_eq!(feed.subscriber_count(), 2);

        feed.publish(&[event(ContextId::EXTERNAL, 1)]);
        assert_eq!(feed.subscriber_count(), 1);
        assert!(kept.try_next().is_some());
    }

    #[test]
    fn next_timeout_returns_none_when_idle() {
        let feed = ChangeFeed::default();
        let sub = feed.subscribe(ContextId::next());
        assert!(sub.next_timeout(Duration::from_millis(5)).is_none());
    }
}
