//! Observer lists for outward notifications
//!
//! Delivery is synchronous: `emit` returns once every subscriber has run.
//! Subscribers are snapshotted before delivery, so a callback may subscribe
//! or unsubscribe without deadlocking.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Handle returned by `subscribe`, used to unsubscribe
pub type SubscriptionId = usize;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct Observers<E> {
    next_id: AtomicUsize,
    listeners: RwLock<Vec<(SubscriptionId, Listener<E>)>>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the id was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_subscribers() {
        let observers = Observers::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = total.clone();
            observers.subscribe(move |value| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        observers.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe() {
        let observers = Observers::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();

        let id = observers.subscribe(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));

        observers.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_reentrant_subscribe_does_not_deadlock() {
        let observers = Arc::new(Observers::<()>::new());
        let inner = observers.clone();
        observers.subscribe(move |_| {
            inner.subscribe(|_| {});
        });

        observers.emit(&());
        assert_eq!(observers.len(), 2);
    }
}
