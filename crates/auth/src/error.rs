//! Error taxonomy for the capability core.

use thiserror::Error;

/// A flag universe or key space was declared incorrectly.
///
/// These are setup-time failures: the process should refuse to start rather
/// than run with a half-defined capability model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("flag universe '{universe}' declares no flags")]
    NoFlags { universe: String },

    #[error("flag universe '{universe}' declares {count} flags (at most 32 fit in a capability set)")]
    TooManyFlags { universe: String, count: usize },

    #[error("flag universe '{universe}' declares '{flag}' more than once")]
    DuplicateFlag { universe: String, flag: String },

    #[error("flag universe '{universe}' has an invalid flag name '{flag}'")]
    InvalidFlagName { universe: String, flag: String },

    #[error("flag universe '{universe}': empty flag name '{name}' collides with a declared flag")]
    EmptyNameCollision { universe: String, name: String },

    #[error("flag universe '{universe}': character map refers to unknown flag '{flag}'")]
    CharMapUnknownFlag { universe: String, flag: String },

    #[error("flag universe '{universe}': character for '{flag}' must be exactly one character, got '{value}'")]
    CharMapNotSingleChar { universe: String, flag: String, value: String },

    #[error("flag universe '{universe}': character '{ch}' is assigned to more than one flag")]
    CharMapDuplicateChar { universe: String, ch: char },

    #[error("flag universe '{universe}': character map has no entry for flag '{flag}'")]
    CharMapIncomplete { universe: String, flag: String },

    #[error("key '{key}' is declared more than once")]
    DuplicateKey { key: String },

    #[error("key '{key}' is not a valid resource name")]
    InvalidKey { key: String },

    #[error("key '{key}' is reserved for the default entry")]
    ReservedKey { key: String },
}

/// A capability value could not be built from the supplied input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("unknown {universe} flag '{flag}'")]
    UnknownFlag { universe: String, flag: String },

    #[error("unknown {universe} key '{key}'")]
    UnknownKey { universe: String, key: String },

    #[error("{universe} has no character map")]
    NoCharMap { universe: String },

    #[error("malformed {universe} value: {reason}")]
    Malformed { universe: String, reason: String },
}
