//! SQLite backend - the durable store used in production

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::application::errors::StorageError;
use crate::domain::traits::KvBackend;

/// All namespaces live in a single `records` table keyed by (namespace, key).
/// Every write is one upsert statement, so a reader never sees half of it.
pub struct SqliteBackend {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (namespace, key)
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run a statement on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("Lock poisoned".to_string()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| StorageError::Unavailable("Database closed".to_string()))?;
            f(conn).map_err(StorageError::from)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("Storage task failed: {}", e)))?
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM records WHERE namespace = ?1 AND key = ?2",
                [&namespace, &key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let (namespace, key, value) = (namespace.to_string(), key.to_string(), value.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO records (namespace, key, value, updated_at)
                 VALUES (?1, ?2, ?3, datetime('now'))
                 ON CONFLICT(namespace, key) DO UPDATE
                 SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![namespace, key, value],
            )
            .map(|_| ())
        })
        .await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM records WHERE namespace = ?1 AND key = ?2",
                [&namespace, &key],
            )
            .map(|rows| rows > 0)
        })
        .await
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT key FROM records WHERE namespace = ?1 ORDER BY key")?;
            let keys = stmt
                .query_map([&namespace], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(keys)
        })
        .await
    }

    async fn close(&self) -> Result<(), StorageError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("Lock poisoned".to_string()))?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| StorageError::from(e))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("Storage task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let db = SqliteBackend::in_memory().unwrap();
        assert_eq!(db.get("karma", "alice").await.unwrap(), None);

        db.put("karma", "alice", "1").await.unwrap();
        db.put("karma", "alice", "2").await.unwrap();
        assert_eq!(db.get("karma", "alice").await.unwrap().as_deref(), Some("2"));

        assert!(db.delete("karma", "alice").await.unwrap());
        assert!(!db.delete("karma", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaces_are_partitioned() {
        let db = SqliteBackend::in_memory().unwrap();
        db.put("karma", "x", "1").await.unwrap();
        db.put("poll", "x", "2").await.unwrap();
        assert_eq!(db.get("karma", "x").await.unwrap().as_deref(), Some("1"));
        assert_eq!(db.keys("poll").await.unwrap(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_backend_is_unavailable() {
        let db = SqliteBackend::in_memory().unwrap();
        db.close().await.unwrap();
        let err = db.get("karma", "x").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");

        let db = SqliteBackend::open(&path).unwrap();
        db.put("poll", "next_id", "7").await.unwrap();
        db.close().await.unwrap();

        let db = SqliteBackend::open(&path).unwrap();
        assert_eq!(db.get("poll", "next_id").await.unwrap().as_deref(), Some("7"));
    }
}
