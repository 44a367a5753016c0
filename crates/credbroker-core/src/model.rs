//! Persisted records owned by the broker.
//!
//! All three are plain serde structs stored as JSON documents through
//! [`RecordStore`](crate::record::RecordStore). None of them is ever updated
//! in place: instances and bindings are written once and deleted whole.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Free-form parameters supplied by the platform on provision or bind.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Credentials map handed back to the platform for a binding.
pub type Credentials = serde_json::Map<String, serde_json::Value>;

/// Authority granted to the bootstrap administrator. Required for `/v2/**`.
pub const ADMIN: &str = "ADMIN";

/// Authority granted to every broker user.
pub const FULL_ACCESS: &str = "FULL_ACCESS";

/// A provisioned service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub service_definition_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl Record for ServiceInstance {
    const PREFIX: &'static str = "instances/";

    fn id(&self) -> &str {
        &self.instance_id
    }
}

/// A service binding and the non-sensitive reference to its vault entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub binding_id: String,
    #[serde(default)]
    pub parameters: Parameters,
    pub credentials: Credentials,
}

impl Record for ServiceBinding {
    const PREFIX: &'static str = "bindings/";

    fn id(&self) -> &str {
        &self.binding_id
    }
}

/// A broker-local account.
///
/// `password_hash` is the PHC-encoded output of the configured
/// [`PasswordEncoder`](crate::password::PasswordEncoder); the plaintext is
/// never stored.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerUser {
    /// Internal identity, generated on insert.
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub authorities: BTreeSet<String>,
}

impl BrokerUser {
    /// Whether the user holds the given authority tag.
    #[must_use]
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}

impl std::fmt::Debug for BrokerUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerUser")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("authorities", &self.authorities)
            .finish()
    }
}

impl Record for BrokerUser {
    const PREFIX: &'static str = "users/";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Secondary key from a username to the [`BrokerUser`] holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameIndex {
    pub username: String,
    pub user_id: String,
}

impl Record for UsernameIndex {
    const PREFIX: &'static str = "usernames/";

    fn id(&self) -> &str {
        &self.username
    }
}
