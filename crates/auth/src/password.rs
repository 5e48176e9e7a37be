//! Password and API-token hashing.
//!
//! The rest of the crate treats hashing as an opaque primitive behind
//! [`PasswordHasher`]. The shipped implementation is PBKDF2-HMAC-SHA256 with a
//! random 16-byte salt, stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.

use core::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Encoded password (or token) hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap an already-encoded hash (e.g. read back from storage).
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Hashing primitive consumed by credential checks.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, secret: &str) -> PasswordHash;

    /// Timing-safe comparison of `secret` against `hash`.
    fn verify(&self, secret: &str, hash: &PasswordHash) -> bool;
}

/// PBKDF2-HMAC-SHA256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pbkdf2Sha256 {
    iterations: u32,
}

impl Pbkdf2Sha256 {
    pub const DEFAULT_ITERATIONS: u32 = 100_000;

    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for Pbkdf2Sha256 {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher for Pbkdf2Sha256 {
    fn hash(&self, secret: &str) -> PasswordHash {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive(secret.as_bytes(), &salt, self.iterations);
        PasswordHash(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            hex::encode(salt),
            hex::encode(key)
        ))
    }

    fn verify(&self, secret: &str, hash: &PasswordHash) -> bool {
        // The iteration count comes from the stored hash so raising the cost
        // does not invalidate existing passwords.
        let mut parts = hash.0.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };
        let (Ok(iterations), Ok(salt), Ok(expected)) = (
            iterations.parse::<u32>(),
            hex::decode(salt),
            hex::decode(expected),
        ) else {
            return false;
        };
        if iterations == 0 {
            return false;
        }

        let derived = derive(secret.as_bytes(), &salt, iterations);
        derived[..].ct_eq(&expected[..]).into()
    }
}

fn derive(secret: &[u8], salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut out);
    out
}

/// Fresh random API token (64 hex characters).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
