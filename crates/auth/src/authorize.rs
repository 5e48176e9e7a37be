//! Credential checks driven through the lockout state machine.
//!
//! A failed login is an ordinary outcome, not an error: [`check_credential`]
//! returns an [`AuthOutcome`] and only mutates the user's lockout fields. The
//! caller persists the record afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lockout::LockoutPolicy;
use crate::password::PasswordHasher;
use crate::roles::Role;
use crate::user::User;

/// A secret presented by a client.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    /// Interactive login (admin GUI); requires the `gui` role flag.
    Password(&'a str),
    /// Bearer token (API); requires the `api` role flag.
    Token(&'a str),
}

impl Credential<'_> {
    /// Role flag a user needs for this kind of credential to be accepted.
    pub fn required_role(&self) -> Role {
        match self {
            Credential::Password(_) => Role::GUI,
            Credential::Token(_) => Role::API,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::Token(_) => "token",
        }
    }
}

impl core::fmt::Debug for Credential<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Credential::{}(<redacted>)", self.kind())
    }
}

/// Why a credential check did not grant access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    UnknownUser,
    WrongPassword,
    Locked,
    NoAccess,
    NoPassword,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::UnknownUser => "unknown_user",
            AuthFailure::WrongPassword => "wrong_password",
            AuthFailure::Locked => "locked",
            AuthFailure::NoAccess => "no_access",
            AuthFailure::NoPassword => "no_password",
        }
    }
}

impl core::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a credential check.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    Denied(AuthFailure),
}

impl AuthOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AuthOutcome::Granted)
    }
}

/// Check `credential` against `user`, applying lockout transitions.
///
/// Order of evaluation:
/// 1. lockout gate: a locked account is refused before any comparison;
/// 2. a secret of the requested kind must be set;
/// 3. the role must carry the flag for this credential kind;
/// 4. the secret is compared; failure counts toward lockout, success resets it.
pub fn check_credential<H>(
    user: &mut User,
    credential: Credential<'_>,
    hasher: &H,
    policy: &LockoutPolicy,
    now: DateTime<Utc>,
) -> AuthOutcome
where
    H: PasswordHasher + ?Sized,
{
    if !user.lockout.admits(policy, now) {
        return AuthOutcome::Denied(AuthFailure::Locked);
    }

    let (secret, stored) = match credential {
        Credential::Password(secret) => (secret, user.password.as_ref()),
        Credential::Token(secret) => (secret, user.token.as_ref()),
    };
    let Some(stored) = stored else {
        return AuthOutcome::Denied(AuthFailure::NoPassword);
    };

    if !user.role.contains(credential.required_role()) {
        return AuthOutcome::Denied(AuthFailure::NoAccess);
    }

    if hasher.verify(secret, stored) {
        user.lockout.record_success();
        AuthOutcome::Granted
    } else {
        user.lockout.record_failure(policy, now);
        AuthOutcome::Denied(AuthFailure::WrongPassword)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::capability_map::KeySpace;
    use crate::password::Pbkdf2Sha256;

    fn hasher() -> Pbkdf2Sha256 {
        Pbkdf2Sha256::new(1)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn gui_user(password: &str) -> User {
        let mut user = User::new("alice", Arc::new(KeySpace::empty()));
        user.role = Role::GUI;
        user.password = Some(hasher().hash(password));
        user
    }

    fn policy(max_fails: u32, auto_unlock: bool) -> LockoutPolicy {
        LockoutPolicy {
            max_fails,
            fail_window_ms: 1000,
            auto_unlock,
        }
    }

    #[test]
    fn correct_password_is_granted_and_resets_counters() {
        let mut user = gui_user("pw");
        let p = policy(5, true);
        let _ = check_credential(&mut user, Credential::Password("nope"), &hasher(), &p, t0());
        assert_eq!(user.lockout.fail_count, 1);

        let outcome = check_credential(&mut user, Credential::Password("pw"), &hasher(), &p, t0());
        assert_eq!(outcome, AuthOutcome::Granted);
        assert_eq!(user.lockout.fail_count, 0);
        assert_eq!(user.lockout.fail_time, None);
    }

    #[test]
    fn success_at_count_four_does_not_lock() {
        let mut user = gui_user("pw");
        let p = policy(5, true);
        for i in 0..4 {
            let outcome =
                check_credential(&mut user, Credential::Password("x"), &hasher(), &p, t0() + Duration::milliseconds(i));
            assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::WrongPassword));
        }
        assert_eq!(user.lockout.fail_count, 4);
        assert!(check_credential(&mut user, Credential::Password("pw"), &hasher(), &p, t0()).is_granted());
        assert!(!user.is_locked());
        assert_eq!(user.lockout.fail_count, 0);
    }

    #[test]
    fn locked_account_short_circuits_before_comparison() {
        let mut user = gui_user("pw");
        let p = policy(3, true);
        for _ in 0..3 {
            let _ = check_credential(&mut user, Credential::Password("x"), &hasher(), &p, t0());
        }
        assert!(user.is_locked());

        let before = user.lockout;
        let outcome = check_credential(&mut user, Credential::Password("pw"), &hasher(), &p, t0());
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::Locked));
        assert_eq!(user.lockout, before);
    }

    #[test]
    fn scenario_three_fails_then_wait_with_auto_unlock() {
        let mut user = gui_user("pw");
        let p = policy(3, true);
        for _ in 0..3 {
            let _ = check_credential(&mut user, Credential::Password("x"), &hasher(), &p, t0());
        }
        assert!(user.lockout.locked);
        assert_eq!(user.lockout.fail_count, 3);

        let later = t0() + Duration::milliseconds(1100);
        let outcome = check_credential(&mut user, Credential::Password("x"), &hasher(), &p, later);
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::WrongPassword));
        assert_eq!(user.lockout.fail_count, 1);
        assert!(!user.lockout.locked);
    }

    #[test]
    fn scenario_three_fails_then_wait_without_auto_unlock() {
        let mut user = gui_user("pw");
        let p = policy(3, false);
        for _ in 0..3 {
            let _ = check_credential(&mut user, Credential::Password("x"), &hasher(), &p, t0());
        }

        let later = t0() + Duration::milliseconds(1100);
        let outcome = check_credential(&mut user, Credential::Password("pw"), &hasher(), &p, later);
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::Locked));
        assert!(user.lockout.locked);
        assert_eq!(user.lockout.fail_count, 3);

        user.unlock();
        assert!(check_credential(&mut user, Credential::Password("pw"), &hasher(), &p, later).is_granted());
    }

    #[test]
    fn missing_secret_and_missing_role_flag() {
        let p = policy(3, true);

        let mut user = gui_user("pw");
        let outcome = check_credential(&mut user, Credential::Token("t"), &hasher(), &p, t0());
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::NoPassword));

        user.token = Some(hasher().hash("t"));
        let outcome = check_credential(&mut user, Credential::Token("t"), &hasher(), &p, t0());
        assert_eq!(outcome, AuthOutcome::Denied(AuthFailure::NoAccess));
        assert_eq!(user.lockout.fail_count, 0);

        user.role = user.role | Role::API;
        assert!(check_credential(&mut user, Credential::Token("t"), &hasher(), &p, t0()).is_granted());
    }

    #[test]
    fn credentials_never_print_secrets() {
        assert_eq!(format!("{:?}", Credential::Password("hunter2")), "Credential::password(<redacted>)");
        assert_eq!(AuthFailure::NoAccess.to_string(), "no_access");
    }
}
