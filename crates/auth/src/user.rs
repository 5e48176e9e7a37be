//! User capability record.
//!
//! A user owns a [`Role`], a per-resource [`ModelAccess`] map, optional
//! password/token hashes and the lockout counters. Records are rebuilt from
//! storage on every request; nothing here is cached between requests.

use std::sync::Arc;

use serde::Serialize;

use dbadmin_core::{DomainError, DomainResult, Entity, UserId};

use crate::capability_map::KeySpace;
use crate::lockout::{LockStatus, LockoutState};
use crate::password::PasswordHash;
use crate::permissions::{Access, ModelAccess};
use crate::roles::Role;

/// Characters a username may not contain (`:` separates bearer credentials).
const USERNAME_FORBIDDEN: &[char] = &[':', '/'];

/// Administrative user account.
///
/// # Invariants
/// - `username` is non-empty and free of `:` and `/`.
/// - A role with `gui` or `admin` requires a password.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password: Option<PasswordHash>,
    pub token: Option<PasswordHash>,
    /// Allowed CORS origin for API use (consumed by the HTTP layer).
    pub cors: Option<String>,
    pub role: Role,
    pub access: ModelAccess,
    pub lockout: LockoutState,
}

impl User {
    /// A user with no role, no access and no credentials.
    pub fn new(username: impl Into<String>, resources: Arc<KeySpace>) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            password: None,
            token: None,
            cors: None,
            role: Role::NONE,
            access: ModelAccess::new(resources),
            lockout: LockoutState::default(),
        }
    }

    /// Check the record-level invariants before it is written.
    pub fn validate(&self) -> DomainResult<()> {
        let name = self.username.trim();
        if name.is_empty() {
            return Err(DomainError::validation("username cannot be empty"));
        }
        if name != self.username || self.username.contains(USERNAME_FORBIDDEN) {
            return Err(DomainError::validation(format!(
                "username '{}' contains forbidden characters",
                self.username
            )));
        }
        if self.role.needs_password() && self.password.is_none() {
            return Err(DomainError::invariant(
                "cannot enable gui/admin access without a password set",
            ));
        }
        Ok(())
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_locked(&self) -> bool {
        self.lockout.status() == LockStatus::Locked
    }

    /// Effective access to `resource` covers every flag of `required`.
    pub fn can(&self, resource: &str, required: Access) -> bool {
        self.access.get(resource).contains(required)
    }

    /// Administrative unlock (manual-unlock policy).
    pub fn unlock(&mut self) {
        self.lockout.unlock();
    }

    /// Public view rendered to API clients (no hashes).
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            role: self.role.to_string(),
            role_bits: self.role.bits(),
            access: self.access.to_array(),
            access_display: self.access.to_display().unwrap_or_default(),
            has_password: self.password.is_some(),
            has_token: self.token.is_some(),
            cors: self.cors.clone(),
            locked: self.lockout.locked,
            fail_count: self.lockout.fail_count,
        }
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Serializable user view for the admin GUI and API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub role: String,
    pub role_bits: i32,
    pub access: Vec<String>,
    pub access_display: String,
    pub has_password: bool,
    pub has_token: bool,
    pub cors: Option<String>,
    pub locked: bool,
    pub fail_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::{PasswordHasher, Pbkdf2Sha256};
    use crate::permissions::resource_keys;

    fn keys() -> Arc<KeySpace> {
        resource_keys(["orders", "billing"]).unwrap()
    }

    #[test]
    fn new_user_is_inert() {
        let user = User::new("alice", keys());
        assert_eq!(user.role, Role::NONE);
        assert!(!user.is_admin());
        assert!(!user.is_locked());
        assert!(!user.can("orders", Access::READ));
        assert!(user.validate().is_ok());
    }

    #[test]
    fn gui_or_admin_without_password_is_rejected() {
        let mut user = User::new("bob", keys());
        user.role = Role::GUI;
        let err = user.validate().unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("password")));

        user.role = Role::API;
        assert!(user.validate().is_ok());

        user.role = Role::ADMIN;
        user.password = Some(Pbkdf2Sha256::new(1).hash("pw"));
        assert!(user.validate().is_ok());
    }

    #[test]
    fn username_rules() {
        for bad in ["", "  ", "a:b", "a/b", " padded"] {
            let user = User::new(bad, keys());
            assert!(
                matches!(user.validate(), Err(DomainError::Validation(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn access_check_uses_default_fallback() {
        let mut user = User::new("carol", keys());
        user.access.set("default", "read").unwrap();
        user.access.set("orders", ["read", "write"]).unwrap();

        assert!(user.can("orders", Access::READ_WRITE));
        assert!(user.can("billing", Access::READ));
        assert!(!user.can("billing", Access::WRITE));
        assert!(user.can("unregistered", Access::READ));
    }

    #[test]
    fn summary_hides_hashes() {
        let mut user = User::new("dave", keys());
        user.password = Some(Pbkdf2Sha256::new(1).hash("pw"));
        user.role = Role::GUI | Role::ADMIN;
        user.access.set("orders", "read").unwrap();

        let summary = user.summary();
        assert_eq!(summary.role, "gui/admin");
        assert_eq!(summary.role_bits, 6);
        assert_eq!(summary.access, vec!["orders-read"]);
        assert_eq!(summary.access_display, "orders: [r], default: [-]");
        assert!(summary.has_password);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("pbkdf2"));
    }
}
