//! Configuration loading and representation.
//!
//! Everything comes from environment variables. Loading goes through a lookup
//! function so tests can feed a map instead of touching the process environment.

use std::net::SocketAddr;
use std::str::FromStr;

use dbadmin_auth::{LockoutPolicy, Pbkdf2Sha256};
use dbadmin_observability::LogFormat;

pub const ENV_BIND: &str = "DBADMIN_BIND";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_MAX_FAILS: &str = "DBADMIN_MAX_FAILS";
pub const ENV_FAIL_WINDOW_MS: &str = "DBADMIN_FAIL_WINDOW_MS";
pub const ENV_AUTO_UNLOCK: &str = "DBADMIN_AUTO_UNLOCK";
pub const ENV_RESOURCES: &str = "DBADMIN_RESOURCES";
pub const ENV_PBKDF2_ITERATIONS: &str = "DBADMIN_PBKDF2_ITERATIONS";
pub const ENV_LOG_FORMAT: &str = "DBADMIN_LOG_FORMAT";
pub const ENV_BOOTSTRAP_ADMIN: &str = "DBADMIN_BOOTSTRAP_ADMIN";
pub const ENV_BOOTSTRAP_PASSWORD: &str = "DBADMIN_BOOTSTRAP_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} is set but {1} is not")]
    Incomplete(&'static str, &'static str),
}

/// Credentials for the first administrator, created on an empty store.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// Postgres URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub lockout: LockoutPolicy,
    /// Registered resource names (ModelAccess keys).
    pub resources: Vec<String>,
    pub pbkdf2_iterations: u32,
    pub log_format: LogFormat,
    pub bootstrap: Option<BootstrapAdmin>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let defaults = LockoutPolicy::default();
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            lockout: defaults,
            resources: Vec::new(),
            pbkdf2_iterations: Pbkdf2Sha256::DEFAULT_ITERATIONS,
            log_format: LogFormat::Json,
            bootstrap: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from `lookup(name)`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let bind = parse_or(ENV_BIND, get(ENV_BIND), defaults.bind)?;

        let max_fails: u32 = parse_or(ENV_MAX_FAILS, get(ENV_MAX_FAILS), defaults.lockout.max_fails)?;
        if max_fails == 0 {
            return Err(invalid(ENV_MAX_FAILS, "0", "must be at least 1"));
        }
        let lockout = LockoutPolicy {
            max_fails,
            fail_window_ms: parse_or(
                ENV_FAIL_WINDOW_MS,
                get(ENV_FAIL_WINDOW_MS),
                defaults.lockout.fail_window_ms,
            )?,
            auto_unlock: match get(ENV_AUTO_UNLOCK) {
                None => defaults.lockout.auto_unlock,
                Some(v) => parse_bool(ENV_AUTO_UNLOCK, &v)?,
            },
        };

        let resources = get(ENV_RESOURCES)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let pbkdf2_iterations: u32 = parse_or(
            ENV_PBKDF2_ITERATIONS,
            get(ENV_PBKDF2_ITERATIONS),
            defaults.pbkdf2_iterations,
        )?;
        if pbkdf2_iterations == 0 {
            return Err(invalid(ENV_PBKDF2_ITERATIONS, "0", "must be at least 1"));
        }

        let log_format = parse_or(ENV_LOG_FORMAT, get(ENV_LOG_FORMAT), defaults.log_format)?;

        let bootstrap = match (get(ENV_BOOTSTRAP_ADMIN), get(ENV_BOOTSTRAP_PASSWORD)) {
            (Some(username), Some(password)) => Some(BootstrapAdmin { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigLoadError::Incomplete(ENV_BOOTSTRAP_ADMIN, ENV_BOOTSTRAP_PASSWORD)),
            (None, Some(_)) => return Err(ConfigLoadError::Incomplete(ENV_BOOTSTRAP_PASSWORD, ENV_BOOTSTRAP_ADMIN)),
        };

        Ok(Self {
            bind,
            database_url: get(ENV_DATABASE_URL),
            lockout,
            resources,
            pbkdf2_iterations,
            log_format,
            bootstrap,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigLoadError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e| invalid(var, &v, e)),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigLoadError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected a boolean")),
    }
}
