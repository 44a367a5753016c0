//! In-memory storage backend.
//!
//! Holds every record in a `BTreeMap` behind a `RwLock`. Nothing survives a
//! restart; the server uses it when no database is configured and the test
//! suites use it everywhere.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError};

/// An in-memory storage backend backed by a `BTreeMap`.
///
/// Clones share the same underlying map. Keys are kept sorted, so prefix
/// listing is a range scan.
///
/// # Examples
///
/// ```
/// # use credbroker_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("instances/a", b"{}").await.unwrap();
/// assert_eq!(backend.count("instances/").await.unwrap(), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().await;
        let keys = data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let data = self.data.read().await;
        Ok(data.contains_key(key))
    }

    async fn count(&self, prefix: &str) -> Result<usize, StorageError> {
        let data = self.data.read().await;
        Ok(data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .count())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("instances/nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_overwrites_existing() {
        let backend = MemoryBackend::new();
        backend.put("bindings/b1", b"v1").await.unwrap();
        backend.put("bindings/b1", b"v2").await.unwrap();
        let val = backend.get("bindings/b1").await.unwrap();
        assert_eq!(val, Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn delete_missing_key_is_noop() {
        let backend = MemoryBackend::new();
        backend.delete("users/nope").await.unwrap();
    }

    #[tokio::test]
    async fn list_is_scoped_to_prefix() {
        let backend = MemoryBackend::new();
        backend.put("bindings/a", b"1").await.unwrap();
        backend.put("bindings/b", b"2").await.unwrap();
        backend.put("instances/a", b"3").await.unwrap();

        let keys = backend.list("bindings/").await.unwrap();
        assert_eq!(keys, vec!["bindings/a", "bindings/b"]);
    }

    #[tokio::test]
    async fn count_matches_prefix_only() {
        let backend = MemoryBackend::new();
        backend.put("users/1", b"1").await.unwrap();
        backend.put("users/2", b"2").await.unwrap();
        backend.put("usersx/3", b"3").await.unwrap();

        assert_eq!(backend.count("users/").await.unwrap(), 2);
        assert_eq!(backend.count("instances/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn exists_tracks_put_and_delete() {
        let backend = MemoryBackend::new();
        assert!(!backend.exists("instances/i").await.unwrap());
        backend.put("instances/i", b"{}").await.unwrap();
        assert!(backend.exists("instances/i").await.unwrap());
        backend.delete("instances/i").await.unwrap();
        assert!(!backend.exists("instances/i").await.unwrap());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.put("key", b"val").await.unwrap();
        assert_eq!(clone.get("key").await.unwrap(), Some(b"val".to_vec()));
    }
}
