//! Durable key/value storage scoped to a backend's mount.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::error::Result;

/// Unit of durable storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub seal_wrap: bool,
}

impl StorageEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into(), seal_wrap: false }
    }

    /// Build an entry holding `value` encoded as JSON.
    pub fn json<T: serde::Serialize>(key: impl Into<String>, value: &T) -> Result<Self> {
        let value = serde_json::to_vec(value)
            .map_err(|e| super::LogicalError::other(format!("failed to encode entry: {}", e)))?;
        Ok(Self::new(key, value))
    }

    /// Decode the entry value as JSON.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.value)
            .map_err(|e| super::LogicalError::other(format!("failed to decode entry: {}", e)))
    }
}

/// Durable store used by backends.
///
/// `get` of a missing key returns `Ok(None)`, never an error.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Keys directly under `prefix`; nested keys appear once as `child/`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Option<StorageEntry>>;

    async fn put(&self, entry: &StorageEntry) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory storage guarded by an async `RwLock`.
#[derive(Debug, Default)]
pub struct InmemStorage {
    entries: RwLock<BTreeMap<String, StorageEntry>>,
}

impl InmemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for InmemStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = Vec::new();
        for key in entries.keys().filter(|k| k.starts_with(prefix)) {
            let rest = &key[prefix.len()..];
            let item = match rest.find('/') {
                Some(idx) => &rest[..=idx],
                None => rest,
            };
            if keys.last().map(String::as_str) != Some(item) {
                keys.push(item.to_string());
            }
        }
        keys.dedup();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: &StorageEntry) -> Result<()> {
        self.entries.write().await.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Storage that holds nothing: reads are empty, writes succeed silently.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorage;

#[async_trait]
impl Storage for NoopStorage {
    async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get(&self, _key: &str) -> Result<Option<StorageEntry>> {
        Ok(None)
    }

    async fn put(&self, _entry: &StorageEntry) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmem_get_missing_is_none() {
        let storage = InmemStorage::new();
        assert_eq!(storage.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_inmem_put_get_delete() {
        let storage = InmemStorage::new();
        let entry = StorageEntry::new("foo", b"bar".to_vec());
        storage.put(&entry).await.unwrap();
        assert_eq!(storage.get("foo").await.unwrap(), Some(entry));

        storage.delete("foo").await.unwrap();
        assert_eq!(storage.get("foo").await.unwrap(), None);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_inmem_list_one_level_deep() {
        let storage = InmemStorage::new();
        for key in ["foo", "nested/a", "nested/b", "nested/deeper/c", "other/x"] {
            storage.put(&StorageEntry::new(key, Vec::new())).await.unwrap();
        }

        assert_eq!(storage.list("").await.unwrap(), vec!["foo", "nested/", "other/"]);
        assert_eq!(storage.list("nested/").await.unwrap(), vec!["a", "b", "deeper/"]);
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_noop_storage_discards_writes() {
        let storage = NoopStorage;
        storage.put(&StorageEntry::new("foo", b"bar".to_vec())).await.unwrap();
        assert_eq!(storage.get("foo").await.unwrap(), None);
        assert!(storage.list("").await.unwrap().is_empty());
    }

    #[test]
    fn test_json_entry() {
        let entry = StorageEntry::json("cfg", &serde_json::json!({"ttl": 30})).unwrap();
        let value: serde_json::Value = entry.decode_json().unwrap();
        assert_eq!(value["ttl"], 30);
    }
}
