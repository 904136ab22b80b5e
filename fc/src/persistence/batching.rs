//! Batch update queue and the persistence wrapper that feeds it
//!
//! The underlying stores commit asynchronously and can drop all but the last
//! of several rapid writes, so writes made while a batch is open are parked
//! here and land as one bulk write when the batch closes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::Value;
use tracing::debug;

use super::Persistence;
use crate::reload::ReloadData;
use crate::sync::lock;

/// Pending writes and reload request for one batch
#[derive(Debug, Default)]
pub struct BatchUpdateQueue {
    pending: BTreeMap<String, Value>,
    reload_requested: bool,
}

impl BatchUpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a pending write; later writes to the same key replace earlier ones
    pub fn queue_write(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug!(%key, "BatchUpdateQueue::queue_write: called");
        self.pending.insert(key, value);
    }

    pub fn request_reload(&mut self) {
        debug!("BatchUpdateQueue::request_reload: called");
        self.reload_requested = true;
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_requested
    }

    pub fn pending_writes(&self) -> &BTreeMap<String, Value> {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && !self.reload_requested
    }

    /// Apply pending writes as one bulk write, then reload once if requested
    pub async fn flush(&mut self, persistence: &dyn Persistence, reload: &dyn ReloadData) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let reload_requested = std::mem::replace(&mut self.reload_requested, false);
        debug!(writes = pending.len(), reload_requested, "BatchUpdateQueue::flush: called");

        if !pending.is_empty() {
            persistence
                .bulk_set(pending)
                .await
                .context("Failed to apply batched filter writes")?;
        }

        if reload_requested {
            reload.reload().await.context("Failed to reload after batch")?;
        }

        Ok(())
    }
}

/// Slot holding the open batch, shared between the context and the wrapper
pub(crate) type BatchSlot = Arc<Mutex<Option<BatchUpdateQueue>>>;

/// Persistence view handed to filter values
///
/// Reads always go to the real store. A write queued earlier in the open batch
/// is not visible to a read later in the same batch.
pub struct BatchingPersistence {
    inner: Arc<dyn Persistence>,
    batch: BatchSlot,
}

impl BatchingPersistence {
    pub fn new(inner: Arc<dyn Persistence>) -> Self {
        Self {
            inner,
            batch: Arc::new(Mutex::new(None)),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &Arc<dyn Persistence> {
        &self.inner
    }

    pub fn is_batching(&self) -> bool {
        lock(&self.batch).is_some()
    }

    /// Open a new batch; false if one is already open
    pub(crate) fn begin(&self) -> bool {
        let mut slot = lock(&self.batch);
        if slot.is_some() {
            return false;
        }
        *slot = Some(BatchUpdateQueue::new());
        true
    }

    /// Close the open batch and hand back its queue
    pub(crate) fn take(&self) -> Option<BatchUpdateQueue> {
        lock(&self.batch).take()
    }

    /// Mark the open batch as needing a reload; false if no batch is open
    pub(crate) fn request_reload(&self) -> bool {
        match lock(&self.batch).as_mut() {
            Some(queue) => {
                queue.request_reload();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Persistence for BatchingPersistence {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let value = {
            let mut slot = lock(&self.batch);
            match slot.as_mut() {
                Some(queue) => {
                    queue.queue_write(key, value);
                    return Ok(());
                }
                None => value,
            }
        };
        self.inner.set(key, value).await
    }

    async fn bulk_set(&self, entries: BTreeMap<String, Value>) -> Result<()> {
        let entries = {
            let mut slot = lock(&self.batch);
            match slot.as_mut() {
                Some(queue) => {
                    for (key, value) in entries {
                        queue.queue_write(key, value);
                    }
                    return Ok(());
                }
                None => entries,
            }
        };
        self.inner.bulk_set(entries).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::persistence::{MemoryStore, WriteRecord};
    use crate::reload::NoopReload;
    use serde_json::json;

    fn wrapper() -> (Arc<MemoryStore>, BatchingPersistence) {
        let store = Arc::new(MemoryStore::new());
        let wrapper = BatchingPersistence::new(store.clone());
        (store, wrapper)
    }

    #[tokio::test]
    async fn test_writes_pass_through_without_batch() {
        let (store, wrapper) = wrapper();

        wrapper.set("a", json!(1)).await.unwrap();
        assert_eq!(store.writes().len(), 1);
        assert_eq!(wrapper.get("a").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_writes_are_parked_while_batching() {
        let (store, wrapper) = wrapper();
        assert!(wrapper.begin());

        wrapper.set("a", json!(1)).await.unwrap();
        wrapper.set("a", json!(2)).await.unwrap();
        wrapper.set("b", json!("x")).await.unwrap();

        assert!(store.writes().is_empty());
        let queue = wrapper.take().unwrap();
        assert_eq!(queue.pending_writes().len(), 2);
        assert_eq!(queue.pending_writes()["a"], json!(2));
    }

    #[tokio::test]
    async fn test_reads_do_not_see_parked_writes() {
        let (_store, wrapper) = wrapper();
        assert!(wrapper.begin());

        wrapper.set("a", json!(1)).await.unwrap();
        assert_eq!(wrapper.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_only_one_batch_at_a_time() {
        let (_store, wrapper) = wrapper();
        assert!(wrapper.begin());
        assert!(!wrapper.begin());
        assert!(wrapper.take().is_some());
        assert!(!wrapper.is_batching());
        assert!(wrapper.begin());
    }

    #[tokio::test]
    async fn test_request_reload_requires_open_batch() {
        let (_store, wrapper) = wrapper();
        assert!(!wrapper.request_reload());

        wrapper.begin();
        assert!(wrapper.request_reload());
        assert!(wrapper.take().unwrap().reload_requested());
    }

    #[tokio::test]
    async fn test_flush_makes_one_bulk_write_and_one_reload() {
        let store = MemoryStore::new();
        let reloads = Arc::new(AtomicUsize::new(0));
        let counter = reloads.clone();
        let reload = move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                eyre::Ok(())
            }
        };

        let mut queue = BatchUpdateQueue::new();
        queue.queue_write("a", json!(1));
        queue.queue_write("a", json!(2));
        queue.queue_write("b", json!("x"));
        queue.request_reload();
        queue.request_reload();

        queue.flush(&store, &reload).await.unwrap();

        assert_eq!(
            store.writes(),
            vec![WriteRecord::BulkSet(BTreeMap::from([
                ("a".to_string(), json!(2)),
                ("b".to_string(), json!("x")),
            ]))]
        );
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_flush_of_empty_queue_touches_nothing() {
        let store = MemoryStore::new();
        let mut queue = BatchUpdateQueue::new();

        queue.flush(&store, &NoopReload).await.unwrap();
        assert!(store.writes().is_empty());
    }
}
