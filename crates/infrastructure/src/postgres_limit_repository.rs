//! PostgreSQL-backed limit rule repository using the `limits` table.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use limitgate_application::{LimitRepository, SubjectRef};
use limitgate_core::{AppError, AppResult};
use limitgate_domain::{
    HttpVerb, LimitDraft, LimitId, LimitPeriod, LimitRule, LimitType, RoleId, ServiceId, UserId,
};
use sqlx::{FromRow, PgPool};
use tracing::warn;


/// PostgreSQL implementation of the limit repository port.
#[derive(Clone)]
pub struct PostgresLimitRepository {
    pool: PgPool,
}

impl PostgresLimitRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_rules(&self, query: LimitQuery<'_>) -> AppResult<Vec<LimitRule>> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list limits: {error}")))?;

        Ok(decode_rows(rows))
    }
}

#[derive(Debug, FromRow)]
struct LimitRow {
    id: i64,
    limit_type: String,
    key_text: String,
    rate: i32,
    period: i16,
    user_id: Option<i64>,
    role_id: Option<i64>,
    service_id: Option<i64>,
    endpoint: Option<String>,
    verb: Option<String>,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl TryFrom<LimitRow> for LimitRule {
    type Error = AppError;

    fn try_from(row: LimitRow) -> Result<Self, Self::Error> {
        let rate = u32::try_from(row.rate)
            .map_err(|error| AppError::Internal(format!("invalid stored limit rate: {error}")))?;

        Ok(Self {
            id: LimitId::new(row.id),
            limit_type: LimitType::from_str(&row.limit_type)?,
            user_id: row.user_id.map(UserId::new),
            role_id: row.role_id.map(RoleId::new),
            service_id: row.service_id.map(ServiceId::new),
            endpoint: row.endpoint,
            verb: row.verb.as_deref().map(HttpVerb::from_str).transpose()?,
            rate,
            period: LimitPeriod::from_index(i64::from(row.period))?,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            key_text: row.key_text,
            created_at: row.created_at,
            modified_at: row.modified_at,
        })
    }
}

fn decode_rows(rows: Vec<LimitRow>) -> Vec<LimitRule> {
    rows.into_iter()
        .filter_map(|row| {
            let limit_id = row.id;
            match LimitRule::try_from(row) {
                Ok(rule) => Some(rule),
                Err(error) => {
                    warn!(limit_id, %error, "skipping malformed limit row");
                    None
                }
            }
        })
        .collect()
}

fn map_write_error(error: sqlx::Error, draft: &LimitDraft, action: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "a limit already exists with those parameters. Limit: {}",
            draft.name()
        ));
    }

    AppError::Internal(format!("failed to {action} limit: {error}"))
}

const SELECT_LIMITS: &str = r#"
    SELECT id, limit_type, key_text, rate, period, user_id, role_id, service_id,
           endpoint, verb, name, description, is_active, created_at, modified_at
    FROM limits
"#;

#[async_trait]
impl LimitRepository for PostgresLimitRepository {
    async fn list_limits(&self) -> AppResult<Vec<LimitRule>> {
        let sql = format!("{SELECT_LIMITS} ORDER BY id");
        self.fetch_rules(sqlx::query_as::<_, LimitRow>(&sql)).await
    }

    async fn list_active_limits(&self) -> AppResult<Vec<LimitRule>> {
        let sql = format!("{SELECT_LIMITS} WHERE is_active ORDER BY id");
        self.fetch_rules(sqlx::query_as::<_, LimitRow>(&sql)).await
    }

    async fn find_limit(&self, limit_id: LimitId) -> AppResult<Option<LimitRule>> {
        let sql = format!("{SELECT_LIMITS} WHERE id = $1");
        let row = sqlx::query_as::<_, LimitRow>(&sql)
            .bind(limit_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find limit: {error}")))?;

        row.map(LimitRule::try_from).transpose()
    }

    async fn list_limits_for_subject(&self, subject: SubjectRef) -> AppResult<Vec<LimitRule>> {
        let (column, subject_id) = match subject {
            SubjectRef::User(user_id) => ("user_id", user_id.as_i64()),
            SubjectRef::Role(role_id) => ("role_id", role_id.as_i64()),
            SubjectRef::Service(service_id) => ("service_id", service_id.as_i64()),
        };
        let sql = format!("{SELECT_LIMITS} WHERE {column} = $1 ORDER BY id");
        self.fetch_rules(sqlx::query_as::<_, LimitRow>(&sql).bind(subject_id))
            .await
    }

    async fn key_exists(&self, key_text: &str) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (SELECT 1 FROM limits WHERE key_text = $1)
            "#,
        )
        .bind(key_text)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to check limit key: {error}")))
    }

    async fn create_limit(&self, draft: LimitDraft) -> AppResult<LimitRule> {
        let sql = r#"
            INSERT INTO limits (
                limit_type, key_text, rate, period, user_id, role_id, service_id,
                endpoint, verb, name, description, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id, limit_type, key_text, rate, period, user_id, role_id, service_id,
                      endpoint, verb, name, description, is_active, created_at, modified_at
        "#;

        let row = bind_draft(sqlx::query_as::<_, LimitRow>(sql), &draft)?
            .fetch_one(&self.pool)
            .await
            .map_err(|error| map_write_error(error, &draft, "create"))?;

        LimitRule::try_from(row)
    }

    async fn update_limit(&self, limit_id: LimitId, draft: LimitDraft) -> AppResult<LimitRule> {
        let sql = r#"
            UPDATE limits
            SET limit_type = $1, key_text = $2, rate = $3, period = $4, user_id = $5,
                role_id = $6, service_id = $7, endpoint = $8, verb = $9, name = $10,
                description = $11, is_active = $12, modified_at = now()
            WHERE id = $13
            RETURNING id, limit_type, key_text, rate, period, user_id, role_id, service_id,
                      endpoint, verb, name, description, is_active, created_at, modified_at
        "#;

        let row = bind_draft(sqlx::query_as::<_, LimitRow>(sql), &draft)?
            .bind(limit_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_write_error(error, &draft, "update"))?
            .ok_or_else(|| AppError::NotFound(format!("limit '{limit_id}' not found")))?;

        LimitRule::try_from(row)
    }

    async fn delete_limit(&self, limit_id: LimitId) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM limits
            WHERE id = $1
            "#,
        )
        .bind(limit_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete limit: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("limit '{limit_id}' not found")));
        }

        Ok(())
    }
}

type LimitQuery<'q> =
    sqlx::query::QueryAs<'q, sqlx::Postgres, LimitRow, sqlx::postgres::PgArguments>;

fn bind_draft<'q>(query: LimitQuery<'q>, draft: &'q LimitDraft) -> AppResult<LimitQuery<'q>> {
    let rate = i32::try_from(draft.rate())
        .map_err(|error| AppError::Validation(format!("limit rate is too large: {error}")))?;

    Ok(query
        .bind(draft.limit_type().as_str())
        .bind(draft.key_text().as_str())
        .bind(rate)
        .bind(draft.period().index())
        .bind(draft.user_id().map(|user_id| user_id.as_i64()))
        .bind(draft.role_id().map(|role_id| role_id.as_i64()))
        .bind(draft.service_id().map(|service_id| service_id.as_i64()))
        .bind(draft.endpoint())
        .bind(draft.verb().map(|verb| verb.as_str()))
        .bind(draft.name())
        .bind(draft.description())
        .bind(draft.is_active()))
}
