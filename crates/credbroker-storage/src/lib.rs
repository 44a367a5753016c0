//! Record storage abstraction for `credbroker`.
//!
//! This crate defines the [`StorageBackend`] trait, a plain key-value
//! interface that knows nothing about service instances, bindings, or users.
//! The typed record store in `credbroker-core` serializes records to JSON and
//! files them under per-entity key prefixes.
//!
//! Two implementations are provided:
//!
//! - [`MemoryBackend`]: in-memory, for tests and local development
//! - [`PostgresBackend`]: relational, backed by `PostgreSQL` (feature `postgres-backend`)

mod error;
mod memory;
#[cfg(feature = "postgres-backend")]
mod postgres_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "postgres-backend")]
pub use postgres_backend::PostgresBackend;

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `instances/abc`,
/// `bindings/def`). Values are opaque byte arrays.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Deleting a non-existent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys that start with the given prefix, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether a key exists in storage.
    ///
    /// The default implementation calls [`get`](StorageBackend::get) and checks
    /// for `Some`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Count the keys under a prefix.
    ///
    /// The default implementation counts the result of
    /// [`list`](StorageBackend::list).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn count(&self, prefix: &str) -> Result<usize, StorageError> {
        Ok(self.list(prefix).await?.len())
    }
}
