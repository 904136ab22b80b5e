//! JSON file persistence
//!
//! All entries live in one JSON object on disk. Every write rewrites the
//! document through a temporary file and a rename, so a bulk write lands
//! all-or-nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::Persistence;

/// Store backed by a single JSON document
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store for the given file; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "JsonFileStore::new: called");
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored entry
    pub async fn entries(&self) -> Result<BTreeMap<String, Value>> {
        debug!(path = ?self.path, "JsonFileStore::entries: called");
        if !fs::try_exists(&self.path).await? {
            debug!("JsonFileStore::entries: store file does not exist");
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .context(format!("Failed to read store file {}", self.path.display()))?;
        if content.trim().is_empty() {
            debug!("JsonFileStore::entries: store file is empty");
            return Ok(BTreeMap::new());
        }

        let entries = serde_json::from_str(&content).context(format!("Failed to parse store file {}", self.path.display()))?;
        Ok(entries)
    }

    /// Remove every stored entry
    pub async fn clear(&self) -> Result<()> {
        debug!(path = ?self.path, "JsonFileStore::clear: called");
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(&self.path).await? {
            fs::remove_file(&self.path).await?;
        }
        Ok(())
    }

    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            debug!(?parent, "JsonFileStore::ensure_dir: creating directory");
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write_entries(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        self.ensure_dir().await?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store.json".to_string());
        let tmp_path = self.path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::now_v7()));
        let content = serde_json::to_string_pretty(entries)? + "\n";

        debug!(?tmp_path, "JsonFileStore::write_entries: writing temp file");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .await
            .context(format!("Failed to replace store file {}", self.path.display()))?;
        debug!(count = entries.len(), "JsonFileStore::write_entries: store replaced");
        Ok(())
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        debug!(%key, "JsonFileStore::get: called");
        let mut entries = self.entries().await?;
        Ok(entries.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        debug!(%key, "JsonFileStore::set: called");
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries().await?;
        entries.insert(key.to_string(), value);
        self.write_entries(&entries).await
    }

    async fn bulk_set(&self, updates: BTreeMap<String, Value>) -> Result<()> {
        debug!(count = updates.len(), "JsonFileStore::bulk_set: called");
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries().await?;
        entries.extend(updates);
        self.write_entries(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("filters.json"));

        assert!(store.entries().await.unwrap().is_empty());
        assert_eq!(store.get("page").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_creates_parent_dirs() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("nested").join("filters.json"));

        store.set("page", json!(2)).await.unwrap();
        assert_eq!(store.get("page").await.unwrap(), Some(json!(2)));
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_bulk_set_merges_with_existing() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("filters.json"));

        store.set("a", json!(1)).await.unwrap();
        store
            .bulk_set(BTreeMap::from([("a".to_string(), json!(2)), ("b".to_string(), json!("x"))]))
            .await
            .unwrap();

        let entries = store.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["a"], json!(2));
        assert_eq!(entries["b"], json!("x"));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("filters.json"));

        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["filters.json".to_string()]);
    }

    #[tokio::test]
    async fn test_clear() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("filters.json"));

        store.set("a", json!(1)).await.unwrap();
        store.clear().await.unwrap();

        assert!(store.entries().await.unwrap().is_empty());
    }
}
