use async_trait::async_trait;
use crate::application::errors::StorageError;

/// KvBackend trait - durable key/value storage partitioned by namespace
///
/// Backends only need single-operation atomicity; read-modify-write
/// serialisation is done by the persistence store above them.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError>;
    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError>;
    /// Returns whether a record was removed
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError>;
    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

    /// Release underlying resources; later calls fail with `Unavailable`
    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
