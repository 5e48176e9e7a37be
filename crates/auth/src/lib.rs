//! `dbadmin-auth`: capability sets, roles, per-resource access and lockout.
//!
//! This crate is intentionally decoupled from HTTP and storage: it decides
//! *whether* something is allowed, adapters decide *how* it is persisted.

pub mod authorize;
pub mod capability_map;
pub mod capability_set;
pub mod error;
pub mod flags;
pub mod guard;
pub mod lockout;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod user;

pub use authorize::{AuthFailure, AuthOutcome, Credential, check_credential};
pub use capability_map::{CapabilityMap, DEFAULT_KEY, KeySpace};
pub use capability_set::{CapabilitySet, FlagSet, IntoBits};
pub use error::{CapabilityError, ConfigError};
pub use flags::FlagUniverse;
pub use guard::{PrivilegeChange, ensure_admin_remains};
pub use lockout::{LockStatus, LockoutPolicy, LockoutState};
pub use password::{PasswordHash, PasswordHasher, Pbkdf2Sha256, generate_token};
pub use permissions::{Access, AccessFlags, ModelAccess, resource_keys};
pub use roles::{Role, RoleFlags};
pub use user::{User, UserSummary};
