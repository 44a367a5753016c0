//! Server configuration for `credbroker`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `BROKER_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use credbroker_core::credhub::{CredHubConfig, DEFAULT_TIMEOUT};
use credbroker_core::users::AdminSeed;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Record storage backend type.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// URL embedded in binding credentials; the instance id is appended.
    pub base_url: String,
    /// CredHub connection. `None` keeps credentials in process memory.
    pub credhub: Option<CredHubConfig>,
    /// Administrator seeded into an empty user directory.
    pub admin: AdminSeed,
    /// Service offering advertised by `/v2/catalog`.
    pub catalog: CatalogConfig,
}

/// The single service and plan this broker offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub service_id: String,
    pub service_name: String,
    pub service_description: String,
    pub plan_id: String,
    pub plan_name: String,
    pub plan_description: String,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// `PostgreSQL` persistent storage.
    Postgres { url: String },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on, listening on `0.0.0.0`
    /// - `BROKER_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8080`)
    /// - `BROKER_STORAGE`: `memory` or `postgres` (default: `memory`)
    /// - `DATABASE_URL`: `PostgreSQL` connection string (used when `BROKER_STORAGE=postgres`)
    /// - `BROKER_LOG_LEVEL`: log filter (default: `info`)
    /// - `BROKER_BASE_URL`: credential URI base (default: `http://localhost:8080`)
    /// - `BROKER_CREDHUB_URL`: CredHub base URL; unset keeps credentials in memory
    /// - `BROKER_CREDHUB_TOKEN`: CredHub bearer token
    /// - `BROKER_CREDHUB_TIMEOUT`: CredHub request timeout in seconds (default: `10`)
    /// - `BROKER_ADMIN_USERNAME` / `BROKER_ADMIN_PASSWORD`: bootstrap admin (default: `admin`/`admin`)
    /// - `BROKER_SERVICE_ID` / `BROKER_PLAN_ID`: catalog ids (default: random per start)
    /// - `BROKER_SERVICE_NAME` / `BROKER_PLAN_NAME`: catalog names (default: `credentialstore`/`standard`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        // Priority: BROKER_BIND_ADDR > PORT > default 127.0.0.1:8080
        let default_addr = SocketAddr::from(([127, 0, 0, 1], 8080));
        let bind_addr = if let Some(addr) = lookup("BROKER_BIND_ADDR") {
            addr.parse().unwrap_or(default_addr)
        } else if let Some(port) = lookup("PORT") {
            SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(8080)))
        } else {
            default_addr
        };

        let storage_backend = match var("BROKER_STORAGE", "memory").to_lowercase().as_str() {
            "postgres" | "postgresql" => StorageBackendType::Postgres {
                url: var("DATABASE_URL", "postgres://localhost/credbroker"),
            },
            _ => StorageBackendType::Memory,
        };

        let credhub = lookup("BROKER_CREDHUB_URL").map(|base_url| CredHubConfig {
            base_url,
            token: var("BROKER_CREDHUB_TOKEN", ""),
            timeout: lookup("BROKER_CREDHUB_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
        });

        let defaults = AdminSeed::default();
        let admin = AdminSeed {
            username: var("BROKER_ADMIN_USERNAME", &defaults.username),
            password: var("BROKER_ADMIN_PASSWORD", &defaults.password),
        };

        let catalog = CatalogConfig {
            service_id: lookup("BROKER_SERVICE_ID")
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            service_name: var("BROKER_SERVICE_NAME", "credentialstore"),
            service_description: "Credhub based credential store service".to_owned(),
            plan_id: lookup("BROKER_PLAN_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            plan_name: var("BROKER_PLAN_NAME", "standard"),
            plan_description: "Credhub based credential store plan".to_owned(),
        };

        Self {
            bind_addr,
            storage_backend,
            log_level: var("BROKER_LOG_LEVEL", "info"),
            base_url: var("BROKER_BASE_URL", "http://localhost:8080"),
            credhub,
            admin,
            catalog,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_use_memory_and_no_credhub() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(cfg.storage_backend, StorageBackendType::Memory);
        assert!(cfg.credhub.is_none());
        assert_eq!(cfg.admin.username, "admin");
        assert_eq!(cfg.catalog.service_name, "credentialstore");
        assert_eq!(cfg.catalog.plan_name, "standard");
    }

    #[test]
    fn port_binds_all_interfaces_unless_addr_given() {
        let cfg = config(&[("PORT", "9000")]);
        assert_eq!(cfg.bind_addr, SocketAddr::from(([0, 0, 0, 0], 9000)));

        let cfg = config(&[("PORT", "9000"), ("BROKER_BIND_ADDR", "127.0.0.1:7000")]);
        assert_eq!(cfg.bind_addr, SocketAddr::from(([127, 0, 0, 1], 7000)));
    }

    #[test]
    fn postgres_storage_reads_database_url() {
        let cfg = config(&[
            ("BROKER_STORAGE", "Postgres"),
            ("DATABASE_URL", "postgres://db/broker"),
        ]);
        assert_eq!(
            cfg.storage_backend,
            StorageBackendType::Postgres {
                url: "postgres://db/broker".to_owned()
            }
        );
    }

    #[test]
    fn credhub_enabled_by_url() {
        let cfg = config(&[
            ("BROKER_CREDHUB_URL", "https://credhub:8844"),
            ("BROKER_CREDHUB_TOKEN", "tok"),
            ("BROKER_CREDHUB_TIMEOUT", "3"),
        ]);
        let credhub = cfg.credhub.unwrap();
        assert_eq!(credhub.base_url, "https://credhub:8844");
        assert_eq!(credhub.token, "tok");
        assert_eq!(credhub.timeout, Duration::from_secs(3));
    }

    #[test]
    fn catalog_ids_are_stable_when_configured() {
        let cfg = config(&[("BROKER_SERVICE_ID", "svc-1"), ("BROKER_PLAN_ID", "plan-1")]);
        assert_eq!(cfg.catalog.service_id, "svc-1");
        assert_eq!(cfg.catalog.plan_id, "plan-1");
    }
}
