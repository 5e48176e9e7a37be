//! User storage abstraction and the in-memory backend.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use dbadmin_auth::{
    KeySpace, LockoutPolicy, ModelAccess, PasswordHash, PrivilegeChange, Role, User,
    ensure_admin_remains,
};
use dbadmin_core::{DomainError, DomainResult, UserId};

use super::codec::UserRow;

/// User store operation error.
///
/// These are infrastructure errors, except [`StoreError::Domain`], which carries
/// an invariant rejected inside the store's critical section.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user already exists: {0}")]
    Duplicate(String),
    #[error("user not found: {0}")]
    NotFound(String),
    #[error("failed to decode user row: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("storage error: {0}")]
    Backend(String),
}

/// A change to one column group of an existing record.
///
/// Stores apply a patch to the record as it is inside their critical section,
/// never to a copy the caller read earlier, and write back only the columns
/// the patch owns. No variant touches `role`: that goes through
/// [`UserStore::set_role_guarded`].
#[derive(Debug, Clone, PartialEq)]
pub enum UserPatch {
    /// A credential check succeeded.
    RecordSuccess,
    /// A credential check failed at `at`.
    RecordFailure {
        policy: LockoutPolicy,
        at: DateTime<Utc>,
    },
    /// Administrative unlock.
    Unlock,
    Access(ModelAccess),
    /// Set or clear the password hash.
    Password(Option<PasswordHash>),
    /// Set or clear the API token hash.
    Token(Option<PasswordHash>),
}

/// Column groups a [`UserPatch`] can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchColumns {
    Lockout,
    Access,
    Password,
    Token,
}

impl UserPatch {
    pub fn columns(&self) -> PatchColumns {
        match self {
            UserPatch::RecordSuccess | UserPatch::RecordFailure { .. } | UserPatch::Unlock => {
                PatchColumns::Lockout
            }
            UserPatch::Access(_) => PatchColumns::Access,
            UserPatch::Password(_) => PatchColumns::Password,
            UserPatch::Token(_) => PatchColumns::Token,
        }
    }

    /// Apply to the current record. Clearing a password is checked against
    /// the record's current role.
    pub fn apply(&self, user: &mut User) -> DomainResult<()> {
        match self {
            UserPatch::RecordSuccess => user.lockout.record_success(),
            UserPatch::RecordFailure { policy, at } => {
                user.lockout.record_failure(policy, *at);
            }
            UserPatch::Unlock => user.unlock(),
            UserPatch::Access(access) => user.access = access.clone(),
            UserPatch::Password(hash) => {
                user.password = hash.clone();
                user.validate()?;
            }
            UserPatch::Token(hash) => user.token = hash.clone(),
        }
        Ok(())
    }
}

/// Persistence for user records.
///
/// Every read decodes a fresh [`User`] from its row; nothing is cached between
/// calls. There is no whole-record overwrite: existing records change through
/// [`patch`](UserStore::patch) or the guarded methods, each of which reads the
/// current record and writes in one critical section.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// All users, ordered by username.
    async fn list(&self) -> Result<Vec<User>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Insert a new record; fails with [`StoreError::Duplicate`] on a taken username.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    /// Apply `patch` to the current record and return the result.
    async fn patch(&self, username: &str, patch: &UserPatch) -> Result<User, StoreError>;

    /// Change the role, rejecting it if it would leave no admin or if the new
    /// role needs a password the record does not have.
    async fn set_role_guarded(&self, username: &str, role: Role) -> Result<User, StoreError>;

    /// Remove a record, rejecting it if it is the last admin. Returns the removed record.
    async fn delete_guarded(&self, username: &str) -> Result<User, StoreError>;
}

#[async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        (**self).get_by_username(username).await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        (**self).list().await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        (**self).count().await
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        (**self).insert(user).await
    }

    async fn patch(&self, username: &str, patch: &UserPatch) -> Result<User, StoreError> {
        (**self).patch(username, patch).await
    }

    async fn set_role_guarded(&self, username: &str, role: Role) -> Result<User, StoreError> {
        (**self).set_role_guarded(username, role).await
    }

    async fn delete_guarded(&self, username: &str) -> Result<User, StoreError> {
        (**self).delete_guarded(username).await
    }
}

/// In-memory user store for tests/dev.
///
/// Rows are kept in their column encoding so every read goes through the same
/// decode path as the database backend. Every mutation reads the current row
/// and writes it back under one write lock.
#[derive(Debug)]
pub struct InMemoryUserStore {
    resources: Arc<KeySpace>,
    rows: RwLock<BTreeMap<String, UserRow>>,
}

impl InMemoryUserStore {
    pub fn new(resources: Arc<KeySpace>) -> Self {
        Self {
            resources,
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn arc(resources: Arc<KeySpace>) -> Arc<Self> {
        Arc::new(Self::new(resources))
    }

    fn decode(&self, row: &UserRow) -> Result<User, StoreError> {
        row.clone().into_user(Arc::clone(&self.resources))
    }

    fn current(&self, rows: &BTreeMap<String, UserRow>, username: &str) -> Result<User, StoreError> {
        let row = rows
            .get(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        self.decode(row)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("user table lock poisoned".to_string())
}

fn admin_ids(rows: &BTreeMap<String, UserRow>) -> Vec<UserId> {
    rows.values()
        .filter(|row| row.is_admin())
        .map(|row| UserId::from_uuid(row.id))
        .collect()
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        rows.get(username).map(|row| self.decode(row)).transpose()
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        rows.values().map(|row| self.decode(row)).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rows.read().map_err(poisoned)?.len())
    }

    #[instrument(skip(self, user), fields(username = %user.username), err)]
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        if rows.contains_key(&user.username) {
            return Err(StoreError::Duplicate(user.username.clone()));
        }
        rows.insert(user.username.clone(), UserRow::from_user(user));
        Ok(())
    }

    async fn patch(&self, username: &str, patch: &UserPatch) -> Result<User, StoreError> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let mut user = self.current(&rows, username)?;
        patch.apply(&mut user)?;

        rows.insert(user.username.clone(), UserRow::from_user(&user));
        Ok(user)
    }

    #[instrument(skip(self, role), fields(role = %role), err)]
    async fn set_role_guarded(&self, username: &str, role: Role) -> Result<User, StoreError> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let mut user = self.current(&rows, username)?;

        ensure_admin_remains(&admin_ids(&rows), &user, PrivilegeChange::SetRole(role))?;
        user.role = role;
        user.validate()?;

        rows.insert(user.username.clone(), UserRow::from_user(&user));
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn delete_guarded(&self, username: &str) -> Result<User, StoreError> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let current = self.current(&rows, username)?;

        ensure_admin_remains(&admin_ids(&rows), &current, PrivilegeChange::Delete)?;

        rows.remove(username);
        Ok(current)
    }
}
