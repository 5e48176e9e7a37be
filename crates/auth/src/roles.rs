//! Role capability: which surfaces (`api`, `gui`) a user may use and whether
//! they administer other users (`admin`).

use std::sync::LazyLock;

use crate::capability_set::{CapabilitySet, FlagSet};
use crate::flags::FlagUniverse;

static ROLE_UNIVERSE: LazyLock<FlagUniverse> = LazyLock::new(|| {
    FlagUniverse::new("role", ["api", "gui", "admin"])
        .and_then(|u| u.with_empty("none"))
        .expect("role flag universe is well-formed")
});

/// Marker for the `{api, gui, admin}` universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleFlags;

impl FlagSet for RoleFlags {
    fn universe() -> &'static FlagUniverse {
        &ROLE_UNIVERSE
    }
}

/// A user's role, persisted as a single integer column.
pub type Role = CapabilitySet<RoleFlags>;

impl CapabilitySet<RoleFlags> {
    pub const NONE: Self = Self::from_raw(0);
    pub const API: Self = Self::from_raw(1);
    pub const GUI: Self = Self::from_raw(1 << 1);
    pub const ADMIN: Self = Self::from_raw(1 << 2);

    pub fn is_admin(&self) -> bool {
        self.contains(Self::ADMIN)
    }

    /// Flags that only make sense for users who can sign in with a password.
    pub fn needs_password(&self) -> bool {
        self.bits() & (Self::GUI.bits() | Self::ADMIN.bits()) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_names_and_none() {
        assert_eq!(Role::new(["api", "gui"]).unwrap().to_string(), "api/gui");
        assert_eq!(Role::new(0).unwrap().to_string(), "none");
        assert_eq!(Role::ADMIN.to_string(), "admin");
    }

    #[test]
    fn constants_match_the_universe() {
        assert_eq!(Role::flag("api").unwrap(), Role::API);
        assert_eq!(Role::flag("gui").unwrap(), Role::GUI);
        assert_eq!(Role::flag("admin").unwrap(), Role::ADMIN);
        assert_eq!(Role::all(), Role::API | Role::GUI | Role::ADMIN);
    }

    #[test]
    fn admin_and_password_requirements() {
        let role: Role = "gui/admin".parse().unwrap();
        assert!(role.is_admin());
        assert!(role.needs_password());
        assert!(!Role::API.needs_password());
        assert!(!Role::NONE.is_admin());
    }

    #[test]
    fn role_has_no_char_form() {
        assert_eq!(Role::API.to_chars(), None);
        assert!(Role::from_chars("a").is_err());
    }
}
