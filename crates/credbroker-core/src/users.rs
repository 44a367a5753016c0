//! Broker-local user directory.
//!
//! Every service binding gets its own user whose generated password is
//! embedded in the vault credential. The directory also owns the bootstrap
//! administrator that the HTTP layer authenticates platform requests against.
//!
//! Plaintext passwords leave this module exactly once, in the
//! [`GeneratedUser`] returned from [`UserDirectory::create_user`]. Only the
//! encoder's hash is persisted. Hashing runs on the blocking pool.
//!
//! Users are stored under their internal id. A `usernames/{username}` index
//! record points at that id, so lookups by username are two point reads.

use std::collections::BTreeSet;
use std::sync::Arc;

use credbroker_storage::StorageBackend;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::UserError;
use crate::model::{ADMIN, BrokerUser, FULL_ACCESS, UsernameIndex};
use crate::password::{PasswordEncoder, PasswordGenerator};
use crate::record::RecordStore;

/// A freshly created user, carrying its plaintext password.
#[derive(Clone)]
pub struct GeneratedUser {
    pub username: String,
    pub password: String,
    pub authorities: BTreeSet<String>,
}

impl std::fmt::Debug for GeneratedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedUser")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("authorities", &self.authorities)
            .finish()
    }
}

/// Credentials of the administrator seeded into an empty directory.
#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl Default for AdminSeed {
    fn default() -> Self {
        Self {
            username: "admin".to_owned(),
            password: "admin".to_owned(),
        }
    }
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Creates, looks up and deletes broker users.
pub struct UserDirectory {
    users: RecordStore<BrokerUser>,
    usernames: RecordStore<UsernameIndex>,
    encoder: Arc<dyn PasswordEncoder>,
    generator: PasswordGenerator,
    admin: AdminSeed,
    /// Serializes the empty-check and insert in [`initialize_users`](Self::initialize_users).
    seed_lock: Mutex<()>,
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("generator", &self.generator)
            .field("admin", &self.admin)
            .finish_non_exhaustive()
    }
}

impl UserDirectory {
    /// Create a directory over the given backend with the default admin seed.
    #[must_use]
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        encoder: Arc<dyn PasswordEncoder>,
        generator: PasswordGenerator,
    ) -> Self {
        Self {
            users: RecordStore::new(Arc::clone(&backend)),
            usernames: RecordStore::new(backend),
            encoder,
            generator,
            admin: AdminSeed::default(),
            seed_lock: Mutex::new(()),
        }
    }

    /// Replace the administrator credentials used by [`initialize_users`](Self::initialize_users).
    #[must_use]
    pub fn with_admin_seed(mut self, admin: AdminSeed) -> Self {
        self.admin = admin;
        self
    }

    /// Seed the administrator if the directory is empty.
    ///
    /// Returns `true` if the administrator was created by this call.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Store` if the user store fails, or
    /// `UserError::Hashing` if the password cannot be encoded.
    pub async fn initialize_users(&self) -> Result<bool, UserError> {
        let _guard = self.seed_lock.lock().await;

        if self.users.count().await? > 0 {
            debug!("user directory already populated, skipping admin seed");
            return Ok(false);
        }

        let authorities = [ADMIN, FULL_ACCESS].map(str::to_owned).into_iter().collect();
        let user = BrokerUser {
            id: uuid::Uuid::new_v4().to_string(),
            username: self.admin.username.clone(),
            password_hash: self.encode(self.admin.password.clone()).await?,
            authorities,
        };
        self.insert(&user).await?;

        info!(username = %user.username, "seeded administrative user");
        Ok(true)
    }

    /// Create a user with a freshly generated password.
    ///
    /// A stale non-administrator user holding the same username is removed
    /// first, so a username maps to at most one user.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Reserved` if the username belongs to an
    /// administrator, `UserError::Store` if the user store fails, or
    /// `UserError::Hashing` if the password cannot be encoded.
    pub async fn create_user(
        &self,
        username: &str,
        authorities: &[&str],
    ) -> Result<GeneratedUser, UserError> {
        if let Some(stale) = self.find_by_username(username).await? {
            if stale.has_authority(ADMIN) {
                warn!(username, "refusing to reissue an administrator username");
                return Err(UserError::Reserved {
                    username: username.to_owned(),
                });
            }
            self.users.delete(&stale.id).await?;
            warn!(username, stale_id = %stale.id, "replaced stale user record");
        }

        let password = self.generator.generate();
        let authorities: BTreeSet<String> =
            authorities.iter().map(|a| (*a).to_owned()).collect();

        let user = BrokerUser {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_owned(),
            password_hash: self.encode(password.clone()).await?,
            authorities: authorities.clone(),
        };
        self.insert(&user).await?;

        debug!(username, "created broker user");
        Ok(GeneratedUser {
            username: username.to_owned(),
            password,
            authorities,
        })
    }

    /// Delete the user with this username. Absent users are a no-op.
    ///
    /// Returns `true` if a user was deleted.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Store` if the user store fails.
    pub async fn delete_user(&self, username: &str) -> Result<bool, UserError> {
        let Some(index) = self.usernames.get(username).await? else {
            return Ok(false);
        };
        let existed = self.users.exists(&index.user_id).await?;
        self.users.delete(&index.user_id).await?;
        self.usernames.delete(username).await?;
        Ok(existed)
    }

    /// Look up a user by username.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Store` if the user store fails.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<BrokerUser>, UserError> {
        let Some(index) = self.usernames.get(username).await? else {
            return Ok(None);
        };
        // An index left behind by an interrupted delete resolves to nothing.
        Ok(self
            .users
            .get(&index.user_id)
            .await?
            .filter(|u| u.username == username))
    }

    /// Return the user if the username exists and the password matches.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Store` if the user store fails, or
    /// `UserError::Hashing` if the verification task dies.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<BrokerUser>, UserError> {
        let Some(user) = self.find_by_username(username).await? else {
            return Ok(None);
        };

        let encoder = Arc::clone(&self.encoder);
        let raw = password.to_owned();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || encoder.verify(&raw, &hash))
            .await
            .map_err(|e| UserError::Hashing {
                reason: e.to_string(),
            })?;
        Ok(matches.then_some(user))
    }

    /// Number of users in the directory.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Store` if the user store fails.
    pub async fn count(&self) -> Result<usize, UserError> {
        Ok(self.users.count().await?)
    }

    /// Store the user, then point its username at it.
    async fn insert(&self, user: &BrokerUser) -> Result<(), UserError> {
        self.users.put(user).await?;
        self.usernames
            .put(&UsernameIndex {
                username: user.username.clone(),
                user_id: user.id.clone(),
            })
            .await?;
        Ok(())
    }

    async fn encode(&self, raw: String) -> Result<String, UserError> {
        let encoder = Arc::clone(&self.encoder);
        tokio::task::spawn_blocking(move || encoder.encode(&raw))
            .await
            .map_err(|e| UserError::Hashing {
                reason: e.to_string(),
            })?
    }
}
