//! Persistence store - namespaced key/value storage shared by all fragments
//!
//! Fragments never see the backend. They get a [`NamespaceHandle`] bound to
//! their own namespace (plus any shared namespaces they declared), and
//! `update` is the one read-modify-write primitive. Serialisation happens
//! per key, so fragments touching different keys never wait on each other.

pub mod memory;
pub mod sqlite;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::application::errors::StorageError;
use crate::domain::entities::Namespace;
use crate::domain::traits::KvBackend;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Store shared by the whole process
pub struct PersistenceStore {
    backend: Arc<dyn KvBackend>,
    locks: Mutex<HashMap<String, KeyLock>>,
    closed: AtomicBool,
}

impl PersistenceStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub async fn get(&self, ns: &Namespace, key: &str) -> Result<Option<String>, StorageError> {
        self.check_open()?;
        self.backend.get(&ns.storage_key(), key).await
    }

    pub async fn put(&self, ns: &Namespace, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_open()?;
        let entry = self.key_lock(ns, key)?;
        let _guard = entry.lock().await;
        self.backend.put(&ns.storage_key(), key, value).await
    }

    /// Atomic read-modify-write. `f` receives the current value (`None` when
    /// absent) and returns the value to store, which is also returned.
    pub async fn update<F>(&self, ns: &Namespace, key: &str, f: F) -> Result<String, StorageError>
    where
        F: FnOnce(Option<String>) -> Result<String, StorageError> + Send,
    {
        self.check_open()?;
        let entry = self.key_lock(ns, key)?;
        let _guard = entry.lock().await;
        let physical = ns.storage_key();
        let current = self.backend.get(&physical, key).await?;
        let next = f(current)?;
        self.backend.put(&physical, key, &next).await?;
        Ok(next)
    }

    pub async fn delete(&self, ns: &Namespace, key: &str) -> Result<bool, StorageError> {
        self.check_open()?;
        let entry = self.key_lock(ns, key)?;
        let _guard = entry.lock().await;
        self.backend.delete(&ns.storage_key(), key).await
    }

    pub async fn keys(&self, ns: &Namespace) -> Result<Vec<String>, StorageError> {
        self.check_open()?;
        self.backend.keys(&ns.storage_key()).await
    }

    /// Release the backend. Every later call fails with `Unavailable`.
    pub async fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("Closing persistence store");
        self.backend.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.is_closed() {
            return Err(StorageError::Unavailable("Store closed".to_string()));
        }
        Ok(())
    }

    fn lock_key(ns: &Namespace, key: &str) -> String {
        format!("{}\u{0}{}", ns.storage_key(), key)
    }

    fn key_lock(&self, ns: &Namespace, key: &str) -> Result<KeyLockEntry<'_>, StorageError> {
        let lock_key = Self::lock_key(ns, key);
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StorageError::Unavailable("Lock poisoned".to_string()))?;
        let lock = Arc::clone(locks.entry(lock_key.clone()).or_default());
        Ok(KeyLockEntry {
            store: self,
            lock_key,
            lock,
        })
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// A claim on one key's lock. Dropping it, including when the owning future
/// is cancelled, removes the map entry once nobody else holds or waits on it.
struct KeyLockEntry<'a> {
    store: &'a PersistenceStore,
    lock_key: String,
    lock: KeyLock,
}

impl KeyLockEntry<'_> {
    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for KeyLockEntry<'_> {
    fn drop(&mut self) {
        let Ok(mut locks) = self.store.locks.lock() else {
            return;
        };
        // clones and drops both happen under the map lock, so the count is
        // exact: one for the map and one for this entry
        if locks.get(&self.lock_key).is_some_and(|l| Arc::strong_count(l) == 2) {
            locks.remove(&self.lock_key);
        }
    }
}

/// A fragment's view of the store
#[derive(Clone)]
pub struct NamespaceHandle {
    store: Arc<PersistenceStore>,
    namespace: Namespace,
    grants: Arc<RwLock<BTreeSet<String>>>,
}

impl NamespaceHandle {
    pub fn new(store: Arc<PersistenceStore>, namespace: Namespace) -> Self {
        Self {
            store,
            namespace,
            grants: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    /// Grants are only added by the fragment loader during the build phase
    pub(crate) fn grant(&self, name: &str) {
        if let Ok(mut grants) = self.grants.write() {
            grants.insert(name.to_string());
        }
    }

    pub fn grants(&self) -> Vec<String> {
        self.grants
            .read()
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Handle on a shared namespace this fragment declared during setup
    pub fn shared(&self, name: &str) -> Result<NamespaceHandle, StorageError> {
        let granted = self.grants.read().map(|g| g.contains(name)).unwrap_or(false);
        if !granted {
            return Err(StorageError::Forbidden(name.to_string()));
        }
        let namespace = Namespace::shared(name)
            .map_err(|_| StorageError::Forbidden(name.to_string()))?;
        Ok(NamespaceHandle::new(Arc::clone(&self.store), namespace))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.store.get(&self.namespace, key).await
    }

    pub async fn put(&self, key: &str, value: impl AsRef<str>) -> Result<(), StorageError> {
        self.store.put(&self.namespace, key, value.as_ref()).await
    }

    pub async fn update<F>(&self, key: &str, f: F) -> Result<String, StorageError>
    where
        F: FnOnce(Option<String>) -> Result<String, StorageError> + Send,
    {
        self.store.update(&self.namespace, key, f).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.store.delete(&self.namespace, key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.store.keys(&self.namespace).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.put(key, raw).await
    }

    /// Typed read-modify-write; an absent record starts from `T::default()`
    pub async fn update_json<T, F>(&self, key: &str, f: F) -> Result<T, StorageError>
    where
        T: Serialize + DeserializeOwned + Default + Send,
        F: FnOnce(&mut T) + Send,
    {
        let raw = self
            .update(key, |current| {
                let mut value: T = match current {
                    Some(raw) => serde_json::from_str(&raw)?,
                    None => T::default(),
                };
                f(&mut value);
                Ok(serde_json::to_string(&value)?)
            })
            .await?;
        Ok(serde_json::from_str(&raw)?)
    }
}
