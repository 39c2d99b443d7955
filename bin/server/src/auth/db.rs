//! Postgres-backed user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::UserId;
use gatehouse_platform_access::{ProviderId, RoleSet, StoreError, User, UserStore};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

const USER_COLUMNS: &str = "id, email, display_name, provider, provider_subject_id, roles, active, created_at, updated_at";

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    display_name: Option<String>,
    provider: String,
    provider_subject_id: String,
    roles: serde_json::Value,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, StoreError> {
        let id = UserId::from_str(&self.id).map_err(|e| StoreError::Backend {
            details: format!("invalid user id '{}': {e}", self.id),
        })?;
        let provider = ProviderId::from_str(&self.provider).map_err(|e| StoreError::Backend {
            details: format!("user {id}: {e}"),
        })?;
        // Unknown role names are dropped rather than failing the row.
        let roles: RoleSet = serde_json::from_value(self.roles).unwrap_or_default();
        Ok(User::with_all_fields(
            id,
            self.email,
            self.display_name,
            provider,
            self.provider_subject_id,
            roles,
            self.active,
            self.created_at,
            self.updated_at,
        ))
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    if let Some(db_err) = err.as_database_error()
        && db_err.is_unique_violation()
    {
        return StoreError::UniqueViolation {
            constraint: db_err.constraint().map(str::to_string),
        };
    }
    StoreError::Backend {
        details: err.to_string(),
    }
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, StoreError> {
    row.map(UserRow::try_into_user).transpose()
}

/// [`UserStore`] over the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Creates a new user store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_provider_subject(
        &self,
        provider: ProviderId,
        provider_subject_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE provider = $1 AND provider_subject_id = $2"
        ))
        .bind(provider.as_str())
        .bind(provider_subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        into_user(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        into_user(row)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
        into_user(row)
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let roles = serde_json::to_value(user.roles()).map_err(|e| StoreError::Backend {
            details: e.to_string(),
        })?;
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, provider, provider_subject_id, roles, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.email())
        .bind(user.display_name())
        .bind(user.provider().as_str())
        .bind(user.provider_subject_id())
        .bind(roles)
        .bind(user.is_active())
        .bind(user.created_at())
        .bind(user.updated_at())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn update_profile(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET email = $2, display_name = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.email())
        .bind(user.display_name())
        .bind(user.updated_at())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}
