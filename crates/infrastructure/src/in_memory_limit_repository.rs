use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use limitgate_application::{LimitRepository, SubjectRef};
use limitgate_core::{AppError, AppResult};
use limitgate_domain::{LimitDraft, LimitId, LimitRule};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct LimitTable {
    rows: BTreeMap<LimitId, LimitRule>,
    last_id: i64,
}

impl LimitTable {
    fn key_taken(&self, key_text: &str, except: Option<LimitId>) -> bool {
        self.rows
            .values()
            .any(|rule| rule.key_text == key_text && Some(rule.id) != except)
    }
}

/// In-memory limit repository implementation.
#[derive(Debug, Default)]
pub struct InMemoryLimitRepository {
    table: RwLock<LimitTable>,
}

impl InMemoryLimitRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn duplicate(draft: &LimitDraft) -> AppError {
    AppError::Conflict(format!(
        "a limit already exists with those parameters. Limit: {}",
        draft.name()
    ))
}

#[async_trait]
impl LimitRepository for InMemoryLimitRepository {
    async fn list_limits(&self) -> AppResult<Vec<LimitRule>> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn list_active_limits(&self) -> AppResult<Vec<LimitRule>> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .values()
            .filter(|rule| rule.is_active)
            .cloned()
            .collect())
    }

    async fn find_limit(&self, limit_id: LimitId) -> AppResult<Option<LimitRule>> {
        Ok(self.table.read().await.rows.get(&limit_id).cloned())
    }

    async fn list_limits_for_subject(&self, subject: SubjectRef) -> AppResult<Vec<LimitRule>> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .values()
            .filter(|rule| match subject {
                SubjectRef::User(user_id) => rule.user_id == Some(user_id),
                SubjectRef::Role(role_id) => rule.role_id == Some(role_id),
                SubjectRef::Service(service_id) => rule.service_id == Some(service_id),
            })
            .cloned()
            .collect())
    }

    async fn key_exists(&self, key_text: &str) -> AppResult<bool> {
        Ok(self.table.read().await.key_taken(key_text, None))
    }

    async fn create_limit(&self, draft: LimitDraft) -> AppResult<LimitRule> {
        let mut table = self.table.write().await;
        if table.key_taken(draft.key_text().as_str(), None) {
            return Err(duplicate(&draft));
        }

        table.last_id += 1;
        let rule = LimitRule::from_draft(LimitId::new(table.last_id), draft, Utc::now());
        table.rows.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update_limit(&self, limit_id: LimitId, draft: LimitDraft) -> AppResult<LimitRule> {
        let mut table = self.table.write().await;
        if table.key_taken(draft.key_text().as_str(), Some(limit_id)) {
            return Err(duplicate(&draft));
        }

        let Some(existing) = table.rows.get_mut(&limit_id) else {
            return Err(AppError::NotFound(format!("limit '{limit_id}' not found")));
        };

        let created_at = existing.created_at;
        *existing = LimitRule::from_draft(limit_id, draft, Utc::now());
        existing.created_at = created_at;
        Ok(existing.clone())
    }

    async fn delete_limit(&self, limit_id: LimitId) -> AppResult<()> {
        self.table
            .write()
            .await
            .rows
            .remove(&limit_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("limit '{limit_id}' not found")))
    }
}
