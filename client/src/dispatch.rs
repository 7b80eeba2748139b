//! Topic-keyed event dispatch.
//!
//! Listeners are stored as `Arc<dyn Fn>` so delivery can snapshot them
//! cheaply. Snapshot-on-deliver semantics: a listener unregistered during a
//! delivery round is still called in that round, and a listener registered
//! during one is not called until the next. A panicking listener is caught
//! and logged; the remaining listeners still get the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Closure type for event listeners.
pub type Listener = dyn Fn(&serde_json::Value) + Send + Sync;

type Registry = DashMap<String, Vec<(u64, Arc<Listener>)>>;

/// Registry of listeners keyed by event topic.
///
/// Thread-safe and shared across tasks via `Arc`.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Arc<Registry>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Create a new dispatcher.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` for `topic`.
    ///
    /// The returned [`Subscription`] is the unregister capability: dropping
    /// it (or calling [`Subscription::cancel`]) stops further deliveries.
    pub fn register(
        &self,
        topic: impl Into<String>,
        listener: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> Subscription {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .entry(topic.clone())
            .or_default()
            .push((id, Arc::new(listener)));

        Subscription {
            registry: Arc::clone(&self.listeners),
            topic,
            id,
        }
    }

    /// Deliver `payload` to every listener currently registered for `topic`.
    pub fn deliver(&self, topic: &str, payload: &serde_json::Value) {
        // Snapshot Arcs under the shard lock, call with the lock released so
        // listeners can register/unregister without deadlocking.
        let snapshot: Vec<Arc<Listener>> = match self.listeners.get(topic) {
            Some(entry) => entry.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };

        for cb in snapshot {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(payload)));
            if outcome.is_err() {
                tracing::warn!(topic, "event listener panicked; continuing delivery");
            }
        }
    }

    /// Number of listeners currently registered for `topic`.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.listeners.get(topic).map(|e| e.len()).unwrap_or(0)
    }
}

/// Unregister capability returned by [`EventDispatcher::register`].
///
/// Cancels on drop.
pub struct Subscription {
    registry: Arc<Registry>,
    topic: String,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once.
    pub fn cancel(&self) {
        if let Some(mut entry) = self.registry.get_mut(&self.topic) {
            entry.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn register_and_deliver() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = dispatcher.register("record.updated", move |payload| {
            seen_clone.lock().push(payload.clone());
        });

        dispatcher.deliver("record.updated", &json!({"id": "a"}));
        dispatcher.deliver("record.deleted", &json!({"id": "b"}));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["id"], "a");
    }

    #[test]
    fn cancel_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicU64::new(0));

        let count_clone = Arc::clone(&count);
        let sub = dispatcher.register("record.updated", move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.deliver("record.updated", &json!({}));
        sub.cancel();
        dispatcher.deliver("record.updated", &json!({}));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count("record.updated"), 0);
    }

    #[test]
    fn drop_unregisters() {
        let dispatcher = EventDispatcher::new();
        {
            let _sub = dispatcher.register("record.created", |_| {});
            assert_eq!(dispatcher.listener_count("record.created"), 1);
        }
        assert_eq!(dispatcher.listener_count("record.created"), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicU64::new(0));

        let _bad = dispatcher.register("record.updated", |_| panic!("listener bug"));
        let count_clone = Arc::clone(&count);
        let _good = dispatcher.register("record.updated", move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.deliver("record.updated", &json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_during_delivery_is_safe() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot_clone = Arc::clone(&slot);
        let sub = dispatcher.register("record.updated", move |_| {
            // Cancel ourselves mid-round.
            if let Some(sub) = slot_clone.lock().take() {
                sub.cancel();
            }
        });
        *slot.lock() = Some(sub);

        dispatcher.deliver("record.updated", &json!({}));
        dispatcher.deliver("record.updated", &json!({}));
        assert_eq!(dispatcher.listener_count("record.updated"), 0);
    }
}
