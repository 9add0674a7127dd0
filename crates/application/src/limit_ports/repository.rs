use async_trait::async_trait;

use limitgate_core::AppResult;
use limitgate_domain::{LimitDraft, LimitId, LimitRule, RoleId, ServiceId, UserId};

/// Subject whose deletion cascades into limit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectRef {
    /// A user.
    User(UserId),
    /// A role.
    Role(RoleId),
    /// A service.
    Service(ServiceId),
}

/// Persistence port for limit rules.
///
/// Rows that no longer decode into a known scope type are skipped by the
/// adapter with a warning rather than failing a listing.
#[async_trait]
pub trait LimitRepository: Send + Sync {
    /// Lists every rule ordered by identifier.
    async fn list_limits(&self) -> AppResult<Vec<LimitRule>>;

    /// Lists active rules ordered by identifier.
    async fn list_active_limits(&self) -> AppResult<Vec<LimitRule>>;

    /// Finds one rule.
    async fn find_limit(&self, limit_id: LimitId) -> AppResult<Option<LimitRule>>;

    /// Lists rules scoped to a user, role or service.
    async fn list_limits_for_subject(&self, subject: SubjectRef) -> AppResult<Vec<LimitRule>>;

    /// Returns whether any rule already uses a key.
    async fn key_exists(&self, key_text: &str) -> AppResult<bool>;

    /// Persists a new rule. A key already in use maps to a conflict.
    async fn create_limit(&self, draft: LimitDraft) -> AppResult<LimitRule>;

    /// Replaces an existing rule's fields.
    async fn update_limit(&self, limit_id: LimitId, draft: LimitDraft) -> AppResult<LimitRule>;

    /// Deletes a rule.
    async fn delete_limit(&self, limit_id: LimitId) -> AppResult<()>;
}
