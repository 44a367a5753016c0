//! Shared application state for the `credbroker` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use credbroker_core::binding::BindingService;
use credbroker_core::instance::InstanceService;
use credbroker_core::password::{Argon2Encoder, PasswordGenerator};
use credbroker_core::users::UserDirectory;
use credbroker_core::vault::CredentialVault;
use credbroker_storage::StorageBackend;

use crate::config::{CatalogConfig, ServerConfig};

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Service instance lifecycle.
    pub instances: Arc<InstanceService>,
    /// Service binding lifecycle.
    pub bindings: Arc<BindingService>,
    /// Broker users, also consulted by the basic-auth layer.
    pub users: Arc<UserDirectory>,
    /// The advertised service offering.
    pub catalog: CatalogConfig,
}

impl AppState {
    /// Assemble the services over one record backend and one vault.
    #[must_use]
    pub fn new(
        config: &ServerConfig,
        backend: Arc<dyn StorageBackend>,
        vault: Arc<dyn CredentialVault>,
    ) -> Self {
        let users = Arc::new(
            UserDirectory::new(
                Arc::clone(&backend),
                Arc::new(Argon2Encoder::new()),
                PasswordGenerator::os_default(),
            )
            .with_admin_seed(config.admin.clone()),
        );
        let bindings = Arc::new(BindingService::new(
            Arc::clone(&backend),
            Arc::clone(&users),
            vault,
            config.base_url.clone(),
        ));

        Self {
            instances: Arc::new(InstanceService::new(backend)),
            bindings,
            users,
            catalog: config.catalog.clone(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}
