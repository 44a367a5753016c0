//! Core library for `credbroker`.
//!
//! Contains the service instance and service binding lifecycle managers, the
//! broker-local user directory, password primitives, the credential vault
//! contract with its in-memory and CredHub implementations, and the typed
//! record store. This crate depends on `credbroker-storage` for the storage
//! backend trait and knows nothing about HTTP.

pub mod binding;
pub mod credhub;
pub mod error;
pub mod instance;
pub mod locks;
pub mod model;
pub mod password;
pub mod record;
pub mod users;
pub mod vault;
