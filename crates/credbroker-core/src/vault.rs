//! Credential vault contract.
//!
//! The broker never keeps binding secrets itself. It writes them to an
//! external vault under a structured [`CredentialName`], grants the bound
//! application read access through an [`AccessPolicy`], and hands the
//! platform only the resulting name.
//!
//! [`MemoryVault`] keeps entries in process memory for development and
//! tests. [`CredHubClient`](crate::credhub::CredHubClient) talks to a real
//! CredHub server.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::VaultError;

/// The four-part name of a service binding credential.
///
/// Rendered as `/c/{broker}/{offering}/{binding}/{credential}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialName {
    pub service_broker_name: String,
    pub service_offering_name: String,
    pub service_binding_id: String,
    pub credential_name: String,
}

impl CredentialName {
    /// Full vault path of this credential.
    #[must_use]
    pub fn path(&self) -> String {
        format!(
            "/c/{}/{}/{}/{}",
            self.service_broker_name,
            self.service_offering_name,
            self.service_binding_id,
            self.credential_name
        )
    }
}

impl fmt::Display for CredentialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// An operation a vault actor may perform on a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    Delete,
    ReadAcl,
    WriteAcl,
}

/// Access granted to one actor on a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Vault actor identity, e.g. `mtls-app:<app guid>`.
    pub actor: String,
    pub operations: BTreeSet<Operation>,
}

impl AccessPolicy {
    /// Read-only access for a platform application.
    #[must_use]
    pub fn read_only_app(app_guid: &str) -> Self {
        Self {
            actor: format!("mtls-app:{app_guid}"),
            operations: BTreeSet::from([Operation::Read]),
        }
    }
}

/// What the vault returns after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultReference {
    /// The stored credential's full name, safe to hand to the platform.
    pub name: String,
}

/// A credential store addressed by [`CredentialName`].
#[async_trait::async_trait]
pub trait CredentialVault: Send + Sync {
    /// Store a JSON credential, overwriting any previous value, and grant
    /// `policy` on it.
    ///
    /// # Errors
    ///
    /// Returns `VaultError` if the vault is unreachable or refuses the write.
    async fn write(
        &self,
        name: &CredentialName,
        payload: &serde_json::Value,
        policy: &AccessPolicy,
    ) -> Result<VaultReference, VaultError>;

    /// Read the current value of a credential.
    ///
    /// # Errors
    ///
    /// Returns `VaultError` if the vault is unreachable or refuses the read.
    async fn read(&self, name: &CredentialName) -> Result<Option<serde_json::Value>, VaultError>;

    /// Delete a credential. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns `VaultError` if the vault is unreachable or refuses the delete.
    async fn delete(&self, name: &CredentialName) -> Result<bool, VaultError>;
}

#[derive(Debug, Clone)]
struct StoredCredential {
    value: serde_json::Value,
    policies: Vec<AccessPolicy>,
}

/// In-process credential vault.
#[derive(Debug, Default)]
pub struct MemoryVault {
    entries: RwLock<HashMap<String, StoredCredential>>,
    unavailable: AtomicBool,
}

impl MemoryVault {
    /// Create an empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the vault were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored credentials.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the vault holds no credentials.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Policies granted on a credential, if it exists.
    pub async fn policies(&self, name: &CredentialName) -> Option<Vec<AccessPolicy>> {
        self.entries
            .read()
            .await
            .get(&name.path())
            .map(|e| e.policies.clone())
    }

    fn check_available(&self, name: &CredentialName) -> Result<(), VaultError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VaultError::Request {
                name: name.path(),
                reason: "vault unavailable".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialVault for MemoryVault {
    async fn write(
        &self,
        name: &CredentialName,
        payload: &serde_json::Value,
        policy: &AccessPolicy,
    ) -> Result<VaultReference, VaultError> {
        self.check_available(name)?;
        let path = name.path();
        self.entries.write().await.insert(
            path.clone(),
            StoredCredential {
                value: payload.clone(),
                policies: vec![policy.clone()],
            },
        );
        Ok(VaultReference { name: path })
    }

    async fn read(&self, name: &CredentialName) -> Result<Option<serde_json::Value>, VaultError> {
        self.check_available(name)?;
        Ok(self
            .entries
            .read()
            .await
            .get(&name.path())
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, name: &CredentialName) -> Result<bool, VaultError> {
        self.check_available(name)?;
        Ok(self.entries.write().await.remove(&name.path()).is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn name() -> CredentialName {
        CredentialName {
            service_broker_name: "i-1".to_owned(),
            service_offering_name: "plan".to_owned(),
            service_binding_id: "b-1".to_owned(),
            credential_name: "b-1".to_owned(),
        }
    }

    #[test]
    fn path_joins_all_four_parts() {
        assert_eq!(name().path(), "/c/i-1/plan/b-1/b-1");
        assert_eq!(name().to_string(), "/c/i-1/plan/b-1/b-1");
    }

    #[test]
    fn read_only_app_policy() {
        let policy = AccessPolicy::read_only_app("app-guid");
        assert_eq!(policy.actor, "mtls-app:app-guid");
        assert_eq!(policy.operations.into_iter().collect::<Vec<_>>(), vec![Operation::Read]);
    }

    #[tokio::test]
    async fn write_read_delete() {
        let vault = MemoryVault::new();
        let payload = serde_json::json!({"username": "b-1"});
        let reference = vault
            .write(&name(), &payload, &AccessPolicy::read_only_app("app"))
            .await
            .unwrap();

        assert_eq!(reference.name, "/c/i-1/plan/b-1/b-1");
        assert_eq!(vault.read(&name()).await.unwrap(), Some(payload));
        assert!(vault.delete(&name()).await.unwrap());
        assert!(!vault.delete(&name()).await.unwrap());
        assert!(vault.is_empty().await);
    }

    #[tokio::test]
    async fn unavailable_vault_fails_every_call() {
        let vault = MemoryVault::new();
        vault.set_unavailable(true);

        let result = vault.delete(&name()).await;
        assert!(matches!(result, Err(VaultError::Request { .. })));
    }
}
