//! In-memory persistence
//!
//! Keeps entries in a map and records every write call, so callers can see
//! exactly how many writes reached the store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use eyre::Result;
use serde_json::Value;
use tracing::debug;

use super::Persistence;
use crate::sync::lock;

/// One write call as seen by the store
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRecord {
    Set { key: String, value: Value },
    BulkSet(BTreeMap<String, Value>),
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries; seeding is not recorded as a write
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            entries: Mutex::new(entries),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the stored entries
    pub fn entries(&self) -> BTreeMap<String, Value> {
        lock(&self.entries).clone()
    }

    /// Every write call received, in order
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.writes).clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        debug!(%key, "MemoryStore::get: called");
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        debug!(%key, "MemoryStore::set: called");
        lock(&self.entries).insert(key.to_string(), value.clone());
        lock(&self.writes).push(WriteRecord::Set {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    async fn bulk_set(&self, entries: BTreeMap<String, Value>) -> Result<()> {
        debug!(count = entries.len(), "MemoryStore::bulk_set: called");
        lock(&self.entries).extend(entries.clone());
        lock(&self.writes).push(WriteRecord::BulkSet(entries));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_seeded_entries_are_not_writes() {
        let store = MemoryStore::with_entries([("page", json!(4))]);
        assert_eq!(store.get("page").await.unwrap(), Some(json!(4)));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_records_each_write_call() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();
        store
            .bulk_set(BTreeMap::from([("b".to_string(), json!(2)), ("c".to_string(), json!(3))]))
            .await
            .unwrap();

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(
            writes[0],
            WriteRecord::Set {
                key: "a".to_string(),
                value: json!(1)
            }
        );
        assert!(matches!(&writes[1], WriteRecord::BulkSet(entries) if entries.len() == 2));
        assert_eq!(store.entries().len(), 3);
    }
}
