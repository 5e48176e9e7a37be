//! Column codec for user records.
//!
//! Column layout (shared by every backend):
//!
//! | column       | type          | encoding                                   |
//! |--------------|---------------|--------------------------------------------|
//! | `role`       | integer       | raw masked role bits                       |
//! | `access`     | text          | JSON object `resource -> 0..3` + `default` |
//! | `fail_count` | integer       | consecutive failures                       |
//! | `fail_time`  | bigint / null | epoch milliseconds of the last failure     |
//! | `locked`     | smallint      | `0` or `1`                                 |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use dbadmin_auth::{KeySpace, LockoutState, ModelAccess, PasswordHash, Role, User};
use dbadmin_core::UserId;

use super::store::StoreError;

/// One persisted user row, column for column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password: Option<String>,
    pub token: Option<String>,
    pub cors: Option<String>,
    pub role: i32,
    pub access: String,
    pub fail_count: i32,
    pub fail_time: Option<i64>,
    pub locked: i16,
}

impl UserRow {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: *user.id.as_uuid(),
            username: user.username.clone(),
            password: user.password.as_ref().map(|h| h.as_str().to_string()),
            token: user.token.as_ref().map(|h| h.as_str().to_string()),
            cors: user.cors.clone(),
            role: user.role.bits(),
            access: user.access.to_json().to_string(),
            fail_count: i32::try_from(user.lockout.fail_count).unwrap_or(i32::MAX),
            fail_time: user.lockout.fail_time.map(|t| t.timestamp_millis()),
            locked: i16::from(user.lockout.locked),
        }
    }

    /// Rebuild the record against the current resource key space.
    ///
    /// Access entries for resources that are no longer registered are dropped.
    pub fn into_user(self, resources: Arc<KeySpace>) -> Result<User, StoreError> {
        let access = if self.access.trim().is_empty() {
            ModelAccess::new(resources)
        } else {
            ModelAccess::from_json_str(resources, &self.access)
                .map_err(|e| decode_error(&self.username, "access", e))?
        };

        let fail_count = u32::try_from(self.fail_count)
            .map_err(|e| decode_error(&self.username, "fail_count", e))?;

        let fail_time = match self.fail_time {
            None => None,
            Some(ms) => Some(from_epoch_millis(ms).ok_or_else(|| {
                decode_error(&self.username, "fail_time", format!("{ms} is out of range"))
            })?),
        };

        Ok(User {
            id: UserId::from_uuid(self.id),
            username: self.username,
            password: self.password.map(PasswordHash::from_encoded),
            token: self.token.map(PasswordHash::from_encoded),
            cors: self.cors,
            role: Role::from_bits(self.role),
            access,
            lockout: LockoutState {
                fail_count,
                fail_time,
                locked: self.locked != 0,
            },
        })
    }

    pub fn is_admin(&self) -> bool {
        Role::from_bits(self.role).is_admin()
    }
}

fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn decode_error(username: &str, column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Decode(format!("user '{username}', column '{column}': {err}"))
}
