//! PostgreSQL-backed directory over the `users`, `roles` and `services` tables.

use async_trait::async_trait;
use limitgate_application::{LimitDirectory, ServiceRecord};
use limitgate_core::{AppError, AppResult};
use limitgate_domain::{RoleId, ServiceId, UserId};
use sqlx::{FromRow, PgPool};

/// PostgreSQL implementation of the limit directory port.
#[derive(Clone)]
pub struct PostgresLimitDirectory {
    pool: PgPool,
}

impl PostgresLimitDirectory {
    /// Creates a directory with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, sql: &str, id: i64, subject: &str) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to look up {subject}: {error}")))
    }
}

#[derive(Debug, FromRow)]
struct ServiceRow {
    id: i64,
    name: String,
}

#[async_trait]
impl LimitDirectory for PostgresLimitDirectory {
    async fn find_service_by_name(&self, name: &str) -> AppResult<Option<ServiceRecord>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT id, name
            FROM services
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find service: {error}")))?;

        Ok(row.map(|row| ServiceRecord {
            id: ServiceId::new(row.id),
            name: row.name,
        }))
    }

    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)",
            user_id.as_i64(),
            "user",
        )
        .await
    }

    async fn role_exists(&self, role_id: RoleId) -> AppResult<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM roles WHERE id = $1)",
            role_id.as_i64(),
            "role",
        )
        .await
    }

    async fn service_exists(&self, service_id: ServiceId) -> AppResult<bool> {
        self.exists(
            "SELECT EXISTS (SELECT 1 FROM services WHERE id = $1)",
            service_id.as_i64(),
            "service",
        )
        .await
    }

    async fn list_active_non_admin_users(&self) -> AppResult<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id
            FROM users
            WHERE is_active AND NOT is_sys_admin
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list users: {error}")))?;

        Ok(ids.into_iter().map(UserId::new).collect())
    }
}
