//! In-memory object store.
//!
//! Used by tests and as the replication target in single-process deployments.
//! Semantics match the filesystem backend, including write-once
//! `put_if_absent` under concurrent callers (the map mutex serializes the
//! check-and-insert).

use crate::traits::{ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    /// When set, every write fails with `UploadFailed`. Lets tests exercise
    /// storage-unavailable paths.
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> StorageResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StorageError::UploadFailed(
                "simulated storage outage".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_key(key: &str) -> StorageResult<()> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        Self::validate_key(key)?;
        self.check_writable()?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, data: Vec<u8>) -> StorageResult<bool> {
        Self::validate_key(key)?;
        self.check_writable()?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(key.to_string(), data);
        Ok(true)
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        Self::validate_key(key)?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::validate_key(key)?;
        self.check_writable()?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Self::validate_key(key)?;
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        Self::validate_key(from_key)?;
        Self::validate_key(to_key)?;
        self.check_writable()?;
        let mut objects = self.objects.lock().unwrap();
        let data = objects
            .get(from_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(from_key.to_string()))?;
        objects.insert(to_key.to_string(), data);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_if_absent_keeps_first_write() {
        let store = MemoryObjectStore::new();
        assert!(store.put_if_absent("clean/x", b"one".to_vec()).await.unwrap());
        assert!(!store.put_if_absent("clean/x", b"two".to_vec()).await.unwrap());
        assert_eq!(store.get("clean/x").await.unwrap(), b"one".to_vec());
    }

    #[tokio::test]
    async fn simulated_outage_fails_writes_only() {
        let store = MemoryObjectStore::new();
        store.put("raw/a/f", b"data".to_vec()).await.unwrap();

        store.set_fail_writes(true);
        assert!(matches!(
            store.put("raw/b/f", b"data".to_vec()).await,
            Err(StorageError::UploadFailed(_))
        ));
        // reads still work during the outage
        assert_eq!(store.get("raw/a/f").await.unwrap(), b"data".to_vec());

        store.set_fail_writes(false);
        assert!(store.put("raw/b/f", b"data".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix() {
        let store = MemoryObjectStore::new();
        store.put("clean/a", b"1".to_vec()).await.unwrap();
        store.put("raw/x/y", b"2".to_vec()).await.unwrap();

        let keys = store.list_keys("clean/").await.unwrap();
        assert_eq!(keys, vec!["clean/a".to_string()]);
    }
}
