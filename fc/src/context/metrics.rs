//! Filter context metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterContextMetrics {
    pub attached_values: usize,
    pub attached_controllers: usize,
    pub notifications_dispatched: u64,
    pub batches_flushed: u64,
    pub batches_discarded: u64,
    pub reloads_triggered: u64,
    pub reloads_deferred: u64,
}

/// Live counters owned by the context
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub notifications_dispatched: AtomicU64,
    pub batches_flushed: AtomicU64,
    pub batches_discarded: AtomicU64,
    pub reloads_triggered: AtomicU64,
    pub reloads_deferred: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, attached_values: usize, attached_controllers: usize) -> FilterContextMetrics {
        FilterContextMetrics {
            attached_values,
            attached_controllers,
            notifications_dispatched: self.notifications_dispatched.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_discarded: self.batches_discarded.load(Ordering::Relaxed),
            reloads_triggered: self.reloads_triggered.load(Ordering::Relaxed),
            reloads_deferred: self.reloads_deferred.load(Ordering::Relaxed),
        }
    }
}
