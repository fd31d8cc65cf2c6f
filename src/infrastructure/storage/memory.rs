//! In-memory backend for tests and throwaway runs

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::traits::KvBackend;

/// Not durable across restarts; everything else behaves like the SQLite backend
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<(String, String), String>>,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable("Memory store closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        self.check_open()?;
        let records = self.records.read().await;
        Ok(records.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_open()?;
        let mut records = self.records.write().await;
        records.insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        self.check_open()?;
        let mut records = self.records.write().await;
        Ok(records.remove(&(namespace.to_string(), key.to_string())).is_some())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        self.check_open()?;
        let records = self.records.read().await;
        Ok(records
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
