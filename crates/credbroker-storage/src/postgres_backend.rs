//! `PostgreSQL` storage backend.
//!
//! Every record lives in one `broker_records` table keyed by its full storage
//! key. Prefix listing and counting use a `text_pattern_ops` index so the
//! per-entity scans stay cheap.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::{StorageBackend, StorageError};

/// Pool size used by [`PostgresBackend::connect`].
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// A storage backend backed by `PostgreSQL`.
///
/// # Examples
///
/// ```no_run
/// # use credbroker_storage::PostgresBackend;
/// # #[tokio::main]
/// # async fn main() {
/// let backend = PostgresBackend::connect("postgres://localhost/credbroker").await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// Connect with the default pool size and create the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit pool size and create the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or migration fails.
    pub async fn connect_with(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Open {
                location: "[redacted database url]".to_owned(),
                reason: e.to_string(),
            })?;

        let backend = Self { pool };
        backend.migrate().await?;
        tracing::debug!(max_connections, "postgres record store ready");
        Ok(backend)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS broker_records (\
                key        TEXT        PRIMARY KEY, \
                value      BYTEA       NOT NULL, \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
            )",
            "CREATE INDEX IF NOT EXISTS idx_broker_records_key_prefix \
             ON broker_records (key text_pattern_ops)",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Open {
                    location: "broker_records".to_owned(),
                    reason: format!("migration failed: {e}"),
                })?;
        }
        Ok(())
    }
}

/// Escape `LIKE` metacharacters so a prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len().saturating_add(1));
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait::async_trait]
impl StorageBackend for PostgresBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM broker_records WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Read {
                    key: key.to_owned(),
                    reason: e.to_string(),
                })?;

        Ok(row.map(|(v,)| v))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO broker_records (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Write {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM broker_records WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM broker_records WHERE key LIKE $1 ESCAPE '\\' ORDER BY key",
        )
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::List {
            prefix: prefix.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM broker_records WHERE key = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Read {
                    key: key.to_owned(),
                    reason: e.to_string(),
                })?;

        Ok(exists)
    }

    async fn count(&self, prefix: &str) -> Result<usize, StorageError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM broker_records WHERE key LIKE $1 ESCAPE '\\'",
        )
        .bind(like_prefix(prefix))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::List {
            prefix: prefix.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(usize::try_from(count).unwrap_or_default())
    }
}
