//! Persistence collaborators
//!
//! The context never talks to a durable store directly. Filter values read and
//! write through [`BatchingPersistence`], which forwards to the real store or
//! parks writes in the open [`BatchUpdateQueue`].

mod batching;
mod file;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use eyre::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use batching::{BatchUpdateQueue, BatchingPersistence};
pub use file::JsonFileStore;
pub use memory::{MemoryStore, WriteRecord};

/// Durable key-value store for filter values
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Read a stored value, `None` if the key was never written
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write one value
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Write several values as a single operation
    async fn bulk_set(&self, entries: BTreeMap<String, Value>) -> Result<()>;
}

impl dyn Persistence {
    /// Read and decode a stored value
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => {
                let decoded = serde_json::from_value(value).context(format!("Failed to decode stored value for '{}'", key))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    /// Encode and write a value
    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value).context(format!("Failed to encode value for '{}'", key))?;
        self.set(key, encoded).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_typed_helpers_round_trip() {
        let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());

        store.set_as("page", &3_i64).await.unwrap();
        assert_eq!(store.get_as::<i64>("page").await.unwrap(), Some(3));
        assert_eq!(store.get_as::<i64>("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_as_reports_decode_errors() {
        let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
        store.set("page", Value::String("three".to_string())).await.unwrap();

        let err = store.get_as::<i64>("page").await.unwrap_err();
        assert!(err.to_string().contains("page"));
    }
}
