//! Development-time hot-reload hooks
//!
//! `HotReloadWatcher` is an explicit subject injected into each context. A
//! context subscribes when it is built and unsubscribes when it is disposed.
//! Listeners are held weakly and dead ones are pruned on the next publish.

use std::sync::{Mutex, Weak};

use tracing::debug;

use crate::sync::lock;

/// Events raised when application code is replaced at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotReloadEvent {
    /// Cached metadata derived from replaced code is stale
    ClearCache,
    /// Replaced code is live; hosts will re-run their setup
    UpdateApplication,
}

impl std::fmt::Display for HotReloadEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClearCache => write!(f, "clear-cache"),
            Self::UpdateApplication => write!(f, "update-application"),
        }
    }
}

/// Receiver of hot-reload events
pub trait HotReloadListener: Send + Sync {
    fn on_hot_reload(&self, event: HotReloadEvent);
}

/// Token returned by [`HotReloadWatcher::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(SubscriptionId, Weak<dyn HotReloadListener>)>,
}

/// Subject fanning hot-reload events out to every live subscriber
#[derive(Default)]
pub struct HotReloadWatcher {
    listeners: Mutex<Listeners>,
}

impl HotReloadWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Weak<dyn HotReloadListener>) -> SubscriptionId {
        let mut listeners = lock(&self.listeners);
        let id = SubscriptionId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, listener));
        debug!(id = id.0, "HotReloadWatcher::subscribe: subscribed");
        id
    }

    /// Remove a subscription; false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        let removed = listeners.entries.len() != before;
        debug!(id = id.0, removed, "HotReloadWatcher::unsubscribe: called");
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.listeners)
            .entries
            .iter()
            .filter(|(_, listener)| listener.strong_count() > 0)
            .count()
    }

    pub fn clear_cache(&self) -> usize {
        self.publish(HotReloadEvent::ClearCache)
    }

    pub fn update_application(&self) -> usize {
        self.publish(HotReloadEvent::UpdateApplication)
    }

    /// Deliver an event to every live subscriber, returning how many received it
    pub fn publish(&self, event: HotReloadEvent) -> usize {
        let live: Vec<_> = {
            let mut listeners = lock(&self.listeners);
            listeners.entries.retain(|(_, listener)| listener.strong_count() > 0);
            listeners.entries.iter().filter_map(|(_, listener)| listener.upgrade()).collect()
        };

        debug!(%event, subscribers = live.len(), "HotReloadWatcher::publish: called");
        for listener in &live {
            listener.on_hot_reload(event);
        }
        live.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<HotReloadEvent>>,
    }

    impl HotReloadListener for Recorder {
        fn on_hot_reload(&self, event: HotReloadEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn subscribe(watcher: &HotReloadWatcher, recorder: &Arc<Recorder>) -> SubscriptionId {
        let weak: Weak<Recorder> = Arc::downgrade(recorder);
        watcher.subscribe(weak)
    }

    #[test]
    fn test_fans_out_to_all_subscribers() {
        let watcher = HotReloadWatcher::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        subscribe(&watcher, &first);
        subscribe(&watcher, &second);

        assert_eq!(watcher.update_application(), 2);
        assert_eq!(*first.events.lock().unwrap(), vec![HotReloadEvent::UpdateApplication]);
        assert_eq!(*second.events.lock().unwrap(), vec![HotReloadEvent::UpdateApplication]);
    }

    #[test]
    fn test_unsubscribed_listener_is_not_called() {
        let watcher = HotReloadWatcher::new();
        let recorder = Arc::new(Recorder::default());
        let id = subscribe(&watcher, &recorder);

        assert!(watcher.unsubscribe(id));
        assert!(!watcher.unsubscribe(id));
        assert_eq!(watcher.clear_cache(), 0);
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let watcher = HotReloadWatcher::new();
        let recorder = Arc::new(Recorder::default());
        subscribe(&watcher, &recorder);
        assert_eq!(watcher.subscriber_count(), 1);

        drop(recorder);
        assert_eq!(watcher.subscriber_count(), 0);
        assert_eq!(watcher.clear_cache(), 0);
    }
}
