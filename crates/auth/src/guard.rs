//! "At least one administrator" invariant.
//!
//! Checked before any mutation that could take the `admin` flag away from the
//! last user holding it. The check itself is pure; storage adapters call it
//! inside the same critical section (lock or transaction) as the write so two
//! concurrent demotions cannot both pass.

use dbadmin_core::{DomainError, DomainResult, Entity, UserId};

use crate::roles::Role;
use crate::user::User;

/// A mutation that may reduce a user's privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeChange {
    /// The user record is removed.
    Delete,
    /// The user's role becomes the given value.
    SetRole(Role),
}

impl PrivilegeChange {
    /// The change takes `admin` away from a user who currently has it.
    pub fn revokes_admin(&self, current: Role) -> bool {
        if !current.is_admin() {
            return false;
        }
        match self {
            PrivilegeChange::Delete => true,
            PrivilegeChange::SetRole(next) => !next.is_admin(),
        }
    }
}

/// Reject `change` if it would leave no administrator.
///
/// `admins` are the ids of every user currently holding the `admin` flag,
/// as read inside the caller's critical section.
pub fn ensure_admin_remains<'a, I>(admins: I, target: &User, change: PrivilegeChange) -> DomainResult<()>
where
    I: IntoIterator<Item = &'a UserId>,
{
    if !change.revokes_admin(target.role) {
        return Ok(());
    }

    let remaining = admins.into_iter().filter(|id| *id != target.id()).count();
    if remaining == 0 {
        tracing::warn!(
            username = %target.username,
            ?change,
            "rejected mutation that would remove the last administrator"
        );
        return Err(DomainError::invariant("cannot remove the last administrator"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::capability_map::KeySpace;

    fn user(name: &str, role: Role) -> User {
        let mut u = User::new(name, Arc::new(KeySpace::empty()));
        u.role = role;
        u
    }

    #[test]
    fn last_admin_cannot_be_demoted_or_deleted() {
        let root = user("root", Role::GUI | Role::ADMIN);
        let admins = [root.id];

        for change in [PrivilegeChange::Delete, PrivilegeChange::SetRole(Role::GUI)] {
            let err = ensure_admin_remains(&admins, &root, change).unwrap_err();
            assert_eq!(
                err,
                DomainError::invariant("cannot remove the last administrator")
            );
        }
    }

    #[test]
    fn either_of_two_admins_may_go() {
        let a = user("a", Role::ADMIN | Role::GUI);
        let b = user("b", Role::ADMIN | Role::GUI);
        let admins = [a.id, b.id];

        assert!(ensure_admin_remains(&admins, &a, PrivilegeChange::Delete).is_ok());
        assert!(ensure_admin_remains(&admins, &b, PrivilegeChange::SetRole(Role::API)).is_ok());
    }

    #[test]
    fn changes_that_keep_admin_always_pass() {
        let root = user("root", Role::GUI | Role::ADMIN);
        let admins = [root.id];
        assert!(ensure_admin_remains(&admins, &root, PrivilegeChange::SetRole(Role::ADMIN)).is_ok());
    }

    #[test]
    fn non_admins_are_unrestricted() {
        let root = user("root", Role::ADMIN | Role::GUI);
        let plain = user("plain", Role::API);
        let admins = [root.id];
        assert!(ensure_admin_remains(&admins, &plain, PrivilegeChange::Delete).is_ok());
        assert!(ensure_admin_remains(&admins, &plain, PrivilegeChange::SetRole(Role::NONE)).is_ok());
    }

    #[test]
    fn revokes_admin_truth_table() {
        assert!(PrivilegeChange::Delete.revokes_admin(Role::ADMIN));
        assert!(!PrivilegeChange::Delete.revokes_admin(Role::GUI));
        assert!(PrivilegeChange::SetRole(Role::GUI).revokes_admin(Role::ADMIN));
        assert!(!PrivilegeChange::SetRole(Role::ADMIN | Role::API).revokes_admin(Role::ADMIN));
    }
}
