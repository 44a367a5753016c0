//! Error types for `credbroker-core`.
//!
//! Each variant carries enough context to diagnose the failure without a
//! debugger. Vault and user errors never include generated passwords or
//! credential payloads, only names and ids.

use credbroker_storage::StorageError;

/// Errors from the typed record store.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The underlying storage backend returned an error.
    #[error("record storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be encoded or decoded.
    #[error("record serialization failed for '{key}': {reason}")]
    Serialization { key: String, reason: String },
}

/// Errors from the user directory.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    /// The one-way password function rejected its input.
    #[error("password hashing failed: {reason}")]
    Hashing { reason: String },

    /// The password generator was configured with unusable settings.
    #[error("invalid user directory config: {reason}")]
    InvalidConfig { reason: String },

    /// The username belongs to an administrator and cannot be reissued.
    #[error("username '{username}' is reserved for an administrator")]
    Reserved { username: String },

    /// The user record store returned an error.
    #[error("user store error: {0}")]
    Store(#[from] RecordError),
}

/// Errors from the credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The vault could not be reached or the transport failed.
    #[error("vault request for '{name}' failed: {reason}")]
    Request { name: String, reason: String },

    /// The vault answered with an error status.
    #[error("vault rejected request for '{name}' with status {status}: {message}")]
    Rejected {
        name: String,
        status: u16,
        message: String,
    },

    /// A vault request or response body could not be encoded or decoded.
    #[error("vault serialization failed: {reason}")]
    Serialization { reason: String },

    /// The vault client was configured with unusable settings.
    #[error("invalid vault client config: {reason}")]
    Config { reason: String },
}

/// Errors from service instance operations.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// No service instance exists with this id.
    #[error("service instance does not exist: {instance_id}")]
    NotFound { instance_id: String },

    /// The instance record store returned an error.
    #[error("instance store error: {0}")]
    Store(#[from] RecordError),
}

/// Errors from service binding operations.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// No service binding exists with this id.
    #[error("service binding does not exist: {binding_id}")]
    NotFound { binding_id: String },

    /// The user directory failed while provisioning or removing the binding user.
    #[error("binding user error: {0}")]
    User(#[from] UserError),

    /// The credential vault failed while writing or deleting the binding credential.
    #[error("binding vault error: {0}")]
    Vault(#[from] VaultError),

    /// The binding record store returned an error.
    #[error("binding store error: {0}")]
    Store(#[from] RecordError),
}
