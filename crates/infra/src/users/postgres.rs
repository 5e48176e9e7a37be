//! Postgres-backed user store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! ## Writes
//!
//! Every mutation of an existing record runs in one transaction that locks the
//! target row with `SELECT ... FOR UPDATE`, applies the change to that fresh
//! row and updates only the columns the change owns. Guarded mutations also
//! lock every admin row before the check, so two concurrent demotions of the
//! last two admins serialize and the second one sees the first one's result.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use dbadmin_auth::{KeySpace, PrivilegeChange, Role, User, ensure_admin_remains};
use dbadmin_core::DomainError;
use dbadmin_core::UserId;

use super::codec::UserRow;
use super::store::{PatchColumns, StoreError, UserPatch, UserStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS dbadmin_users (
    id          UUID PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    password    TEXT NULL,
    token       TEXT NULL,
    cors        TEXT NULL,
    role        INTEGER NOT NULL DEFAULT 0,
    access      TEXT NOT NULL DEFAULT '{}',
    fail_count  INTEGER NOT NULL DEFAULT 0,
    fail_time   BIGINT NULL,
    locked      SMALLINT NOT NULL DEFAULT 0,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const SELECT_COLUMNS: &str =
    "id, username, password, token, cors, role, access, fail_count, fail_time, locked";

/// Postgres-backed user store.
///
/// Uses the SQLx connection pool, so it is `Send + Sync` and cheap to share.
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
    resources: Arc<KeySpace>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool, resources: Arc<KeySpace>) -> Self {
        Self {
            pool: Arc::new(pool),
            resources,
        }
    }

    /// Connect and make sure the user table exists.
    pub async fn connect(database_url: &str, resources: Arc<KeySpace>) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool, resources);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    fn decode(&self, row: &PgRow) -> Result<User, StoreError> {
        let row = user_row(row)
            .map_err(|e| StoreError::Decode(format!("failed to read user row: {e}")))?;
        row.into_user(Arc::clone(&self.resources))
    }

    /// Update the columns owned by `columns` from `row`.
    async fn write_columns(
        tx: &mut Transaction<'_, Postgres>,
        row: &UserRow,
        columns: PatchColumns,
        operation: &str,
    ) -> Result<(), StoreError> {
        let query = match columns {
            PatchColumns::Lockout => sqlx::query(
                r#"
                UPDATE dbadmin_users
                SET fail_count = $2, fail_time = $3, locked = $4, updated_at = NOW()
                WHERE username = $1
                "#,
            )
            .bind(&row.username)
            .bind(row.fail_count)
            .bind(row.fail_time)
            .bind(row.locked),
            PatchColumns::Access => sqlx::query(
                "UPDATE dbadmin_users SET access = $2, updated_at = NOW() WHERE username = $1",
            )
            .bind(&row.username)
            .bind(&row.access),
            PatchColumns::Password => sqlx::query(
                "UPDATE dbadmin_users SET password = $2, updated_at = NOW() WHERE username = $1",
            )
            .bind(&row.username)
            .bind(&row.password),
            PatchColumns::Token => sqlx::query(
                "UPDATE dbadmin_users SET token = $2, updated_at = NOW() WHERE username = $1",
            )
            .bind(&row.username)
            .bind(&row.token),
        };

        let result = query
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(row.username.clone()));
        }
        Ok(())
    }

    async fn lock_admins(tx: &mut Transaction<'_, Postgres>) -> Result<Vec<UserId>, StoreError> {
        sqlx::query(
            r#"
            SELECT id FROM dbadmin_users
            WHERE (role & $1) <> 0
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(Role::ADMIN.bits())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_admins", e))?
        .iter()
        .map(|row| row.try_get::<Uuid, _>("id").map(UserId::from_uuid))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Decode(format!("failed to read admin id: {e}")))
    }

    async fn lock_user(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        username: &str,
    ) -> Result<User, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM dbadmin_users WHERE username = $1 FOR UPDATE"
        ))
        .bind(username)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_user", e))?
        .ok_or_else(|| StoreError::NotFound(username.to_string()))?;

        self.decode(&row)
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Roll back and surface an invariant rejected inside the transaction.
async fn reject<T>(tx: Transaction<'_, Postgres>, err: DomainError) -> Result<T, StoreError> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))?;
    Err(err.into())
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), StoreError> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self), err)]
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM dbadmin_users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_user", e))?;

        row.as_ref().map(|row| self.decode(row)).transpose()
    }

    #[instrument(skip(self), fields(user_count), err)]
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM dbadmin_users ORDER BY username ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;

        Span::current().record("user_count", rows.len());
        rows.iter().map(|row| self.decode(row)).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM dbadmin_users")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users", e))?
            .try_get("total")
            .map_err(|e| StoreError::Decode(format!("failed to read count: {e}")))?;
        Ok(usize::try_from(total).unwrap_or(0))
    }

    #[instrument(skip(self, user), fields(username = %user.username), err)]
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let row = UserRow::from_user(user);
        sqlx::query(
            r#"
            INSERT INTO dbadmin_users (
                id, username, password, token, cors,
                role, access, fail_count, fail_time, locked
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(row.id)
        .bind(&row.username)
        .bind(&row.password)
        .bind(&row.token)
        .bind(&row.cors)
        .bind(row.role)
        .bind(&row.access)
        .bind(row.fail_count)
        .bind(row.fail_time)
        .bind(row.locked)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(row.username.clone())
            } else {
                map_sqlx_error("insert_user", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self, patch), fields(columns = ?patch.columns()), err)]
    async fn patch(&self, username: &str, patch: &UserPatch) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        let mut user = self.lock_user(&mut tx, username).await?;

        if let Err(e) = patch.apply(&mut user) {
            return reject(tx, e).await;
        }

        Self::write_columns(&mut tx, &UserRow::from_user(&user), patch.columns(), "patch_user").await?;
        commit(tx).await?;
        Ok(user)
    }

    #[instrument(skip(self, role), fields(role = %role), err)]
    async fn set_role_guarded(&self, username: &str, role: Role) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        let admins = Self::lock_admins(&mut tx).await?;
        let mut user = self.lock_user(&mut tx, username).await?;

        if let Err(e) = ensure_admin_remains(&admins, &user, PrivilegeChange::SetRole(role)) {
            return reject(tx, e).await;
        }
        user.role = role;
        if let Err(e) = user.validate() {
            return reject(tx, e).await;
        }

        sqlx::query("UPDATE dbadmin_users SET role = $2, updated_at = NOW() WHERE username = $1")
            .bind(username)
            .bind(role.bits())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_role", e))?;
        commit(tx).await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn delete_guarded(&self, username: &str) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        let admins = Self::lock_admins(&mut tx).await?;
        let current = self.lock_user(&mut tx, username).await?;

        if let Err(e) = ensure_admin_remains(&admins, &current, PrivilegeChange::Delete) {
            return reject(tx, e).await;
        }

        sqlx::query("DELETE FROM dbadmin_users WHERE username = $1")
            .bind(username)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;

        commit(tx).await?;
        Ok(current)
    }
}

fn user_row(row: &PgRow) -> Result<UserRow, sqlx::Error> {
    Ok(UserRow {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        token: row.try_get("token")?,
        cors: row.try_get("cors")?,
        role: row.try_get("role")?,
        access: row.try_get("access")?,
        fail_count: row.try_get("fail_count")?,
        fail_time: row.try_get("fail_time")?,
        locked: row.try_get("locked")?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Backend(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}
