//! Typed record store.
//!
//! A [`RecordStore`] wraps a [`StorageBackend`] and files one entity type
//! under its own key prefix, serializing each record as JSON. It is the
//! repository seam the lifecycle managers talk to.

use std::marker::PhantomData;
use std::sync::Arc;

use credbroker_storage::StorageBackend;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RecordError;

/// An entity that can be persisted in a [`RecordStore`].
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Key prefix for this entity type, including the trailing `/`.
    const PREFIX: &'static str;

    /// The record's unique key within its entity type.
    fn id(&self) -> &str;
}

/// Repository for one record type over a shared storage backend.
pub struct RecordStore<T> {
    backend: Arc<dyn StorageBackend>,
    _record: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}

impl<T: Record> RecordStore<T> {
    /// Create a store for `T` over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            _record: PhantomData,
        }
    }

    fn key(id: &str) -> String {
        format!("{}{}", T::PREFIX, urlencoding::encode(id))
    }

    /// Whether a record with this id exists.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Storage` if the backend fails.
    pub async fn exists(&self, id: &str) -> Result<bool, RecordError> {
        Ok(self.backend.exists(&Self::key(id)).await?)
    }

    /// Load a record by id.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Storage` if the backend fails, or
    /// `RecordError::Serialization` if the stored document is corrupt.
    pub async fn get(&self, id: &str) -> Result<Option<T>, RecordError> {
        let key = Self::key(id);
        match self.backend.get(&key).await? {
            None => Ok(None),
            Some(data) => Self::decode(&key, &data).map(Some),
        }
    }

    /// Insert or overwrite a record under its own id.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Serialization` if encoding fails, or
    /// `RecordError::Storage` if the backend fails.
    pub async fn put(&self, record: &T) -> Result<(), RecordError> {
        let key = Self::key(record.id());
        let data = serde_json::to_vec(record).map_err(|e| RecordError::Serialization {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.backend.put(&key, &data).await?;
        Ok(())
    }

    /// Delete a record by id. Absent ids are not an error.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Storage` if the backend fails.
    pub async fn delete(&self, id: &str) -> Result<(), RecordError> {
        self.backend.delete(&Self::key(id)).await?;
        Ok(())
    }

    /// Number of records of this type.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Storage` if the backend fails.
    pub async fn count(&self) -> Result<usize, RecordError> {
        Ok(self.backend.count(T::PREFIX).await?)
    }

    /// Load every record of this type, in key order.
    ///
    /// Keys that disappear between listing and reading are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Storage` if the backend fails, or
    /// `RecordError::Serialization` if a stored document is corrupt.
    pub async fn list(&self) -> Result<Vec<T>, RecordError> {
        let keys = self.backend.list(T::PREFIX).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(data) = self.backend.get(&key).await? {
                records.push(Self::decode(&key, &data)?);
            }
        }
        Ok(records)
    }

    fn decode(key: &str, data: &[u8]) -> Result<T, RecordError> {
        serde_json::from_slice(data).map_err(|e| RecordError::Serialization {
            key: key.to_owned(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ServiceInstance;
    use credbroker_storage::MemoryBackend;

    fn instance(id: &str) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_owned(),
            service_definition_id: "svc".to_owned(),
            plan_id: "plan".to_owned(),
            parameters: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_record() {
        let store = RecordStore::<ServiceInstance>::new(Arc::new(MemoryBackend::new()));
        store.put(&instance("i-1")).await.unwrap();

        assert!(store.exists("i-1").await.unwrap());
        assert_eq!(store.get("i-1").await.unwrap(), Some(instance("i-1")));
    }

    #[tokio::test]
    async fn ids_with_separators_stay_isolated() {
        let backend = Arc::new(MemoryBackend::new());
        let store = RecordStore::<ServiceInstance>::new(backend.clone());
        store.put(&instance("a/b")).await.unwrap();

        assert!(!store.exists("a").await.unwrap());
        assert_eq!(backend.list("instances/").await.unwrap(), vec!["instances/a%2Fb"]);
        assert_eq!(store.get("a/b").await.unwrap(), Some(instance("a/b")));
    }

    #[tokio::test]
    async fn corrupt_document_is_a_serialization_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("instances/bad", b"not json").await.unwrap();
        let store = RecordStore::<ServiceInstance>::new(backend);

        let result = store.get("bad").await;
        assert!(matches!(result, Err(RecordError::Serialization { .. })));
    }

    #[tokio::test]
    async fn count_and_list_cover_only_this_type() {
        let backend = Arc::new(MemoryBackend::new());
        backend.put("bindings/x", b"{}").await.unwrap();
        let store = RecordStore::<ServiceInstance>::new(backend);
        store.put(&instance("i-1")).await.unwrap();
        store.put(&instance("i-2")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.instance_id)
            .collect();
        assert_eq!(ids, vec!["i-1", "i-2"]);
    }
}
