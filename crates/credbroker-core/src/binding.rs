//! Service binding lifecycle.
//!
//! Binding a new id touches three independently failable resources, in this
//! order:
//!
//! 1. a broker user named after the binding, with a generated password
//! 2. a vault credential `{uri, username, password}` readable only by the
//!    bound application
//! 3. the binding record, holding just the vault reference
//!
//! The record goes last so a binding is never persisted with a reference the
//! platform did not receive. There is no compensation: a failure after step 1
//! or 2 leaves the earlier resources behind, and a later create for the same
//! id overwrites them. Unbinding removes the three in the same order,
//! treating an already missing user or credential as removed.

use std::sync::Arc;

use credbroker_storage::StorageBackend;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::BindingError;
use crate::locks::KeyedLocks;
use crate::model::{Credentials, FULL_ACCESS, Parameters, ServiceBinding};
use crate::record::RecordStore;
use crate::users::UserDirectory;
use crate::vault::{AccessPolicy, CredentialName, CredentialVault};

/// Key of the vault reference in a binding's credentials map.
pub const CREDENTIAL_REF_KEY: &str = "credhub-ref";

/// Parameters of [`BindingService::create_binding`].
#[derive(Debug, Clone)]
pub struct CreateBindingRequest {
    pub binding_id: String,
    pub instance_id: String,
    pub plan_id: String,
    /// Platform id of the application that will read the credential.
    pub app_guid: String,
    pub parameters: Parameters,
}

/// Outcome of [`BindingService::create_binding`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateBindingResponse {
    pub binding_existed: bool,
    pub credentials: Credentials,
}

/// Stored state of one binding.
#[derive(Debug, Clone, PartialEq)]
pub struct GetBindingResponse {
    pub parameters: Parameters,
    pub credentials: Credentials,
}

/// Creates, reads and deletes service bindings and their vault credentials.
pub struct BindingService {
    bindings: RecordStore<ServiceBinding>,
    users: Arc<UserDirectory>,
    vault: Arc<dyn CredentialVault>,
    /// URL the generated credential points at; the instance id is appended.
    base_url: String,
    locks: KeyedLocks,
}

impl std::fmt::Debug for BindingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingService")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BindingService {
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        users: Arc<UserDirectory>,
        vault: Arc<dyn CredentialVault>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            bindings: RecordStore::new(backend),
            users,
            vault,
            base_url: base_url.into(),
            locks: KeyedLocks::new(),
        }
    }

    /// Bind, or return the stored credentials if the binding already exists.
    ///
    /// # Errors
    ///
    /// Returns `BindingError::User`, `BindingError::Vault` or
    /// `BindingError::Store` if the corresponding dependency fails. Nothing
    /// is retried.
    pub async fn create_binding(
        &self,
        request: CreateBindingRequest,
    ) -> Result<CreateBindingResponse, BindingError> {
        let binding_id = request.binding_id.as_str();
        let _guard = self.locks.lock(binding_id).await;

        if let Some(existing) = self.bindings.get(binding_id).await? {
            debug!(binding_id, "service binding already exists");
            return Ok(CreateBindingResponse {
                binding_existed: true,
                credentials: existing.credentials,
            });
        }

        let user = self
            .users
            .create_user(binding_id, &[FULL_ACCESS, request.instance_id.as_str()])
            .await?;

        let payload = json!({
            "uri": self.credential_uri(&request.instance_id),
            "username": user.username,
            "password": user.password,
        });
        let name = credential_name(&request.instance_id, &request.plan_id, binding_id);
        let policy = AccessPolicy::read_only_app(&request.app_guid);

        let reference = match self.vault.write(&name, &payload, &policy).await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(binding_id, error = %e, "vault write failed, binding user left in place");
                return Err(e.into());
            }
        };

        let mut credentials = Credentials::new();
        credentials.insert(CREDENTIAL_REF_KEY.to_owned(), json!(reference.name));

        let binding = ServiceBinding {
            binding_id: binding_id.to_owned(),
            parameters: request.parameters,
            credentials: credentials.clone(),
        };
        if let Err(e) = self.bindings.put(&binding).await {
            warn!(
                binding_id,
                credential = %reference.name,
                error = %e,
                "binding record not saved, user and credential left in place"
            );
            return Err(e.into());
        }

        info!(
            binding_id,
            instance_id = %request.instance_id,
            credential = %reference.name,
            "service binding created"
        );
        Ok(CreateBindingResponse {
            binding_existed: false,
            credentials,
        })
    }

    /// Read a stored binding.
    ///
    /// # Errors
    ///
    /// Returns `BindingError::NotFound` if no binding has this id, or
    /// `BindingError::Store` if the record store fails.
    pub async fn get_binding(&self, binding_id: &str) -> Result<GetBindingResponse, BindingError> {
        let binding = self
            .bindings
            .get(binding_id)
            .await?
            .ok_or_else(|| BindingError::NotFound {
                binding_id: binding_id.to_owned(),
            })?;

        Ok(GetBindingResponse {
            parameters: binding.parameters,
            credentials: binding.credentials,
        })
    }

    /// Unbind: remove the binding user, its vault credential and the record.
    ///
    /// If the vault delete fails the user is already gone but the record
    /// stays, so a retry of the same unbind finishes the job.
    ///
    /// # Errors
    ///
    /// Returns `BindingError::NotFound` without touching the user or vault if
    /// no binding record has this id. Returns `BindingError::User`,
    /// `BindingError::Vault` or `BindingError::Store` if a dependency fails.
    pub async fn delete_binding(
        &self,
        instance_id: &str,
        plan_id: &str,
        binding_id: &str,
    ) -> Result<(), BindingError> {
        let _guard = self.locks.lock(binding_id).await;

        if !self.bindings.exists(binding_id).await? {
            return Err(BindingError::NotFound {
                binding_id: binding_id.to_owned(),
            });
        }

        if !self.users.delete_user(binding_id).await? {
            warn!(binding_id, "binding user was already gone");
        }

        let name = credential_name(instance_id, plan_id, binding_id);
        if !self.vault.delete(&name).await? {
            warn!(binding_id, credential = %name, "vault credential was already gone");
        }

        self.bindings.delete(binding_id).await?;

        info!(binding_id, instance_id, "service binding deleted");
        Ok(())
    }

    fn credential_uri(&self, instance_id: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(instance_id)
        )
    }
}

/// Vault name of a binding's credential.
#[must_use]
pub fn credential_name(instance_id: &str, plan_id: &str, binding_id: &str) -> CredentialName {
    CredentialName {
        service_broker_name: instance_id.to_owned(),
        service_offering_name: plan_id.to_owned(),
        service_binding_id: binding_id.to_owned(),
        credential_name: binding_id.to_owned(),
    }
}
