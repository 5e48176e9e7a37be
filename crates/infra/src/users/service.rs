//! User administration and credential checks on top of a [`UserStore`].

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use dbadmin_auth::{
    Access, AuthFailure, AuthOutcome, CapabilityError, Credential, KeySpace, LockoutPolicy,
    ModelAccess, PasswordHasher, Role, User, check_credential, generate_token,
};
use dbadmin_core::DomainError;

use super::store::{StoreError, UserPatch, UserStore};

/// Service operation error.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Store(StoreError),
    /// A credential check was invoked without a username or secret.
    #[error("missing identifier: {0}")]
    MissingIdentifier(&'static str),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(e) => ServiceError::Domain(e),
            StoreError::Duplicate(name) => {
                ServiceError::Domain(DomainError::conflict(format!("user '{name}' already exists")))
            }
            StoreError::NotFound(name) => ServiceError::Domain(DomainError::not_found(format!("user '{name}'"))),
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result of a login or bearer check.
#[derive(Debug, Clone, PartialEq)]
pub enum Authentication {
    Granted(User),
    Denied(AuthFailure),
}

/// Input for [`UserService::create_user`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Strict slash-delimited role, e.g. `"api/gui"`.
    #[serde(default)]
    pub role: Option<String>,
    /// Array form, e.g. `["orders-read", "default-read"]`.
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default)]
    pub cors: Option<String>,
}

/// User administration service.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    resources: Arc<KeySpace>,
    hasher: Arc<dyn PasswordHasher>,
    policy: LockoutPolicy,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        resources: Arc<KeySpace>,
        hasher: Arc<dyn PasswordHasher>,
        policy: LockoutPolicy,
    ) -> Self {
        Self {
            store,
            resources,
            hasher,
            policy,
        }
    }

    pub fn resources(&self) -> &Arc<KeySpace> {
        &self.resources
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Interactive login with a password (requires the `gui` flag).
    pub async fn authenticate_password(&self, username: &str, password: &str) -> ServiceResult<Authentication> {
        self.authenticate(username, Credential::Password(password)).await
    }

    /// Bearer check with an API token (requires the `api` flag).
    pub async fn authenticate_token(&self, username: &str, token: &str) -> ServiceResult<Authentication> {
        self.authenticate(username, Credential::Token(token)).await
    }

    #[instrument(skip(self, credential), fields(kind = credential.kind()))]
    async fn authenticate(&self, username: &str, credential: Credential<'_>) -> ServiceResult<Authentication> {
        if username.is_empty() {
            return Err(ServiceError::MissingIdentifier("username"));
        }
        let secret = match credential {
            Credential::Password(s) | Credential::Token(s) => s,
        };
        if secret.is_empty() {
            return Err(ServiceError::MissingIdentifier(credential.kind()));
        }

        let Some(mut user) = self.store.get_by_username(username).await? else {
            warn!(username, "login for unknown user");
            return Ok(Authentication::Denied(AuthFailure::UnknownUser));
        };

        // The secret check is slow; only its effect on the lockout columns is
        // written back, applied to the record as it is by then.
        let before = user.lockout;
        let now = Utc::now();
        let outcome = check_credential(&mut user, credential, self.hasher.as_ref(), &self.policy, now);
        if user.lockout != before {
            let patch = match outcome {
                AuthOutcome::Granted => UserPatch::RecordSuccess,
                AuthOutcome::Denied(_) => UserPatch::RecordFailure {
                    policy: self.policy,
                    at: now,
                },
            };
            user = self.store.patch(username, &patch).await?;
        }

        match outcome {
            AuthOutcome::Granted => {
                info!(username, "login succeeded");
                Ok(Authentication::Granted(user))
            }
            AuthOutcome::Denied(failure) => {
                warn!(
                    username,
                    reason = failure.as_str(),
                    fail_count = user.lockout.fail_count,
                    locked = user.lockout.locked,
                    "login failed"
                );
                if failure == AuthFailure::WrongPassword && user.is_locked() && !before.locked {
                    warn!(username, "account locked after repeated failures");
                }
                Ok(Authentication::Denied(failure))
            }
        }
    }

    pub async fn list(&self) -> ServiceResult<Vec<User>> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, username: &str) -> ServiceResult<User> {
        self.store
            .get_by_username(username)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("user '{username}'")).into())
    }

    #[instrument(skip(self, new), fields(username = %new.username), err)]
    pub async fn create_user(&self, new: NewUser) -> ServiceResult<User> {
        let mut user = User::new(new.username, Arc::clone(&self.resources));
        if let Some(role) = new.role.as_deref() {
            user.role = role.parse::<Role>()?;
        }
        user.access = ModelAccess::from_array(Arc::clone(&self.resources), &new.access);
        user.password = new
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| self.hasher.hash(p));
        user.cors = new.cors.filter(|c| !c.is_empty());
        user.validate()?;

        self.store.insert(&user).await?;
        info!(role = %user.role, "user created");
        Ok(user)
    }

    #[instrument(skip(self, role), fields(role = %role), err)]
    pub async fn set_role(&self, username: &str, role: Role) -> ServiceResult<User> {
        let user = self.store.set_role_guarded(username, role).await?;
        info!(username, role = %role, "role changed");
        Ok(user)
    }

    #[instrument(skip(self, access), err)]
    pub async fn set_access(&self, username: &str, access: ModelAccess) -> ServiceResult<User> {
        let user = self.store.patch(username, &UserPatch::Access(access)).await?;
        info!(username, access = %user.access.to_list_string(), "access changed");
        Ok(user)
    }

    /// Set or clear (`None`) the password.
    #[instrument(skip(self, password), err)]
    pub async fn set_password(&self, username: &str, password: Option<&str>) -> ServiceResult<User> {
        let hash = password.filter(|p| !p.is_empty()).map(|p| self.hasher.hash(p));
        let user = self.store.patch(username, &UserPatch::Password(hash)).await?;
        info!(username, cleared = user.password.is_none(), "password changed");
        Ok(user)
    }

    /// Issue a fresh API token, replacing any previous one. The plain token is
    /// returned once; only its hash is stored.
    #[instrument(skip(self), err)]
    pub async fn issue_token(&self, username: &str) -> ServiceResult<String> {
        let token = generate_token();
        let hash = self.hasher.hash(&token);
        self.store.patch(username, &UserPatch::Token(Some(hash))).await?;
        info!(username, "api token issued");
        Ok(token)
    }

    #[instrument(skip(self), err)]
    pub async fn unlock(&self, username: &str) -> ServiceResult<User> {
        let user = self.store.patch(username, &UserPatch::Unlock).await?;
        info!(username, "account unlocked");
        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, username: &str) -> ServiceResult<User> {
        let removed = self.store.delete_guarded(username).await?;
        info!(username, "user deleted");
        Ok(removed)
    }

    /// Create an admin with full default access when the store is empty.
    ///
    /// Returns `None` if any user already exists.
    #[instrument(skip(self, password), err)]
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> ServiceResult<Option<User>> {
        if password.is_empty() {
            return Err(ServiceError::MissingIdentifier("password"));
        }
        if self.store.count().await? > 0 {
            return Ok(None);
        }
        let mut user = User::new(username, Arc::clone(&self.resources));
        user.role = Role::API | Role::GUI | Role::ADMIN;
        user.access.reset(Access::READ_WRITE)?;
        user.password = Some(self.hasher.hash(password));
        user.validate()?;

        self.store.insert(&user).await?;
        info!(username, "bootstrap administrator created");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::users::store::InMemoryUserStore;
    use dbadmin_auth::{Pbkdf2Sha256, resource_keys};

    /// Runs queued role changes right after a lookup returns, so they land
    /// while the caller is still checking the credential it just read.
    struct RoleChangesDuringLookup {
        inner: Arc<InMemoryUserStore>,
        queued: Mutex<Vec<(&'static str, Role)>>,
    }

    #[async_trait]
    impl UserStore for RoleChangesDuringLookup {
        async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            let read = self.inner.get_by_username(username).await?;
            let queued = std::mem::take(&mut *self.queued.lock().unwrap());
            for (name, role) in queued {
                self.inner.set_role_guarded(name, role).await?;
            }
            Ok(read)
        }

        async fn list(&self) -> Result<Vec<User>, StoreError> {
            self.inner.list().await
        }

        async fn count(&self) -> Result<usize, StoreError> {
            self.inner.count().await
        }

        async fn insert(&self, user: &User) -> Result<(), StoreError> {
            self.inner.insert(user).await
        }

        async fn patch(&self, username: &str, patch: &UserPatch) -> Result<User, StoreError> {
            self.inner.patch(username, patch).await
        }

        async fn set_role_guarded(&self, username: &str, role: Role) -> Result<User, StoreError> {
            self.inner.set_role_guarded(username, role).await
        }

        async fn delete_guarded(&self, username: &str) -> Result<User, StoreError> {
            self.inner.delete_guarded(username).await
        }
    }

    impl RoleChangesDuringLookup {
        fn queue(&self, username: &'static str, role: Role) {
            self.queued.lock().unwrap().push((username, role));
        }
    }

    fn interleaving_service() -> (UserService, Arc<RoleChangesDuringLookup>) {
        let keys = resource_keys(["orders"]).unwrap();
        let store = Arc::new(RoleChangesDuringLookup {
            inner: InMemoryUserStore::arc(Arc::clone(&keys)),
            queued: Mutex::new(Vec::new()),
        });
        let svc = UserService::new(
            Arc::clone(&store) as Arc<dyn UserStore>,
            keys,
            Arc::new(Pbkdf2Sha256::new(1)),
            LockoutPolicy::default(),
        );
        (svc, store)
    }

    async fn admin_names(store: &InMemoryUserStore) -> Vec<String> {
        store
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(User::is_admin)
            .map(|u| u.username)
            .collect()
    }

    fn service_with(policy: LockoutPolicy) -> UserService {
        let keys = resource_keys(["orders", "billing"]).unwrap();
        UserService::new(
            InMemoryUserStore::arc(Arc::clone(&keys)),
            keys,
            Arc::new(Pbkdf2Sha256::new(1)),
            policy,
        )
    }

    fn service() -> UserService {
        service_with(LockoutPolicy::default())
    }

    fn new_user(name: &str, role: &str, password: Option<&str>) -> NewUser {
        NewUser {
            username: name.to_string(),
            password: password.map(str::to_string),
            role: Some(role.to_string()),
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn create_then_login() {
        let svc = service();
        let mut new = new_user("alice", "gui", Some("pw"));
        new.access = vec!["orders-read".into(), "default-read".into(), "bogus-token".into()];
        let created = svc.create_user(new).await.unwrap();
        assert_eq!(created.access.to_display().unwrap(), "orders: [r], default: [r]");

        let auth = svc.authenticate_password("alice", "pw").await.unwrap();
        assert!(matches!(auth, Authentication::Granted(u) if u.username == "alice"));
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let svc = service();
        let err = svc.create_user(new_user("a", "gui/root", Some("pw"))).await.unwrap_err();
        assert!(matches!(err, ServiceError::Capability(CapabilityError::UnknownFlag { .. })));

        let err = svc.create_user(new_user("b", "gui", None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvariantViolation(_))));

        svc.create_user(new_user("c", "api", None)).await.unwrap();
        let err = svc.create_user(new_user("c", "api", None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn failures_are_persisted_and_lock_the_account() {
        let svc = service_with(LockoutPolicy {
            max_fails: 3,
            fail_window_ms: 60_000,
            auto_unlock: false,
        });
        svc.create_user(new_user("bob", "gui", Some("pw"))).await.unwrap();

        for _ in 0..3 {
            let auth = svc.authenticate_password("bob", "nope").await.unwrap();
            assert_eq!(auth, Authentication::Denied(AuthFailure::WrongPassword));
        }
        assert!(svc.get("bob").await.unwrap().is_locked());

        let auth = svc.authenticate_password("bob", "pw").await.unwrap();
        assert_eq!(auth, Authentication::Denied(AuthFailure::Locked));

        svc.unlock("bob").await.unwrap();
        let auth = svc.authenticate_password("bob", "pw").await.unwrap();
        assert!(matches!(auth, Authentication::Granted(_)));
        assert_eq!(svc.get("bob").await.unwrap().lockout.fail_count, 0);
    }

    #[tokio::test]
    async fn unknown_user_and_missing_identifiers() {
        let svc = service();
        let auth = svc.authenticate_password("ghost", "pw").await.unwrap();
        assert_eq!(auth, Authentication::Denied(AuthFailure::UnknownUser));

        assert!(matches!(
            svc.authenticate_password("", "pw").await,
            Err(ServiceError::MissingIdentifier("username"))
        ));
        assert!(matches!(
            svc.authenticate_token("ghost", "").await,
            Err(ServiceError::MissingIdentifier("token"))
        ));
    }

    #[tokio::test]
    async fn tokens_require_the_api_flag() {
        let svc = service();
        svc.create_user(new_user("gui_only", "gui", Some("pw"))).await.unwrap();
        let token = svc.issue_token("gui_only").await.unwrap();
        let auth = svc.authenticate_token("gui_only", &token).await.unwrap();
        assert_eq!(auth, Authentication::Denied(AuthFailure::NoAccess));

        svc.set_role("gui_only", Role::GUI | Role::API).await.unwrap();
        let auth = svc.authenticate_token("gui_only", &token).await.unwrap();
        assert!(matches!(auth, Authentication::Granted(_)));

        let fresh = svc.issue_token("gui_only").await.unwrap();
        let auth = svc.authenticate_token("gui_only", &token).await.unwrap();
        assert_eq!(auth, Authentication::Denied(AuthFailure::WrongPassword));
        let auth = svc.authenticate_token("gui_only", &fresh).await.unwrap();
        assert!(matches!(auth, Authentication::Granted(_)));
    }

    #[tokio::test]
    async fn admin_invariant_holds_through_the_service() {
        let svc = service();
        svc.bootstrap_admin("root", "pw").await.unwrap().unwrap();
        assert!(svc.bootstrap_admin("again", "pw").await.unwrap().is_none());

        let err = svc.set_role("root", Role::GUI).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvariantViolation(_))));
        let err = svc.delete("root").await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvariantViolation(_))));

        svc.create_user(new_user("second", "gui/admin", Some("pw"))).await.unwrap();
        svc.set_role("root", Role::GUI).await.unwrap();
        let err = svc.delete("second").await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn password_cannot_be_cleared_while_gui_is_enabled() {
        let svc = service();
        svc.create_user(new_user("eve", "gui", Some("pw"))).await.unwrap();
        let err = svc.set_password("eve", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvariantViolation(_))));

        svc.set_role("eve", Role::API).await.unwrap();
        let user = svc.set_password("eve", None).await.unwrap();
        assert!(user.password.is_none());
    }

    #[tokio::test]
    async fn access_updates_round_trip_through_storage() {
        let svc = service();
        svc.create_user(new_user("fay", "api", None)).await.unwrap();

        let access = ModelAccess::parse_display(Arc::clone(svc.resources()), "billing: [rw], default: [r]").unwrap();
        svc.set_access("fay", access).await.unwrap();

        let user = svc.get("fay").await.unwrap();
        assert!(user.can("billing", Access::READ_WRITE));
        assert!(user.can("orders", Access::READ));
        assert!(!user.can("orders", Access::WRITE));
    }

    #[tokio::test]
    async fn missing_users_are_not_found() {
        let svc = service();
        assert!(matches!(
            svc.unlock("nobody").await,
            Err(ServiceError::Domain(DomainError::NotFound(_)))
        ));
        assert!(matches!(
            svc.delete("nobody").await,
            Err(ServiceError::Domain(DomainError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn failed_login_does_not_undo_role_changes_made_meanwhile() {
        let (svc, store) = interleaving_service();
        svc.bootstrap_admin("root", "pw").await.unwrap();
        svc.create_user(new_user("carol", "gui", Some("pw"))).await.unwrap();

        // While carol's login is in flight, carol is promoted and root demoted.
        store.queue("carol", Role::GUI | Role::ADMIN);
        store.queue("root", Role::GUI);

        let auth = svc.authenticate_password("carol", "wrong").await.unwrap();
        assert_eq!(auth, Authentication::Denied(AuthFailure::WrongPassword));

        assert_eq!(admin_names(&store.inner).await, vec!["carol"]);
        let carol = svc.get("carol").await.unwrap();
        assert_eq!(carol.role, Role::GUI | Role::ADMIN);
        assert_eq!(carol.lockout.fail_count, 1);
    }

    #[tokio::test]
    async fn successful_login_does_not_restore_a_revoked_admin_flag() {
        let (svc, store) = interleaving_service();
        svc.bootstrap_admin("root", "pw").await.unwrap();
        svc.create_user(new_user("carol", "gui/admin", Some("pw"))).await.unwrap();
        let auth = svc.authenticate_password("carol", "wrong").await.unwrap();
        assert_eq!(auth, Authentication::Denied(AuthFailure::WrongPassword));

        // Carol loses admin while her next (successful) login is in flight.
        store.queue("carol", Role::GUI);

        let auth = svc.authenticate_password("carol", "pw").await.unwrap();
        let Authentication::Granted(carol) = auth else {
            panic!("expected a granted login, got {auth:?}");
        };
        assert_eq!(carol.role, Role::GUI);
        assert_eq!(carol.lockout.fail_count, 0);
        assert_eq!(admin_names(&store.inner).await, vec!["root"]);
    }
}
