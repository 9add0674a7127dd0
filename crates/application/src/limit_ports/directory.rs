use async_trait::async_trait;

use limitgate_core::AppResult;
use limitgate_domain::{RoleId, ServiceId, UserId};

/// Service row resolved from a routed service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Service identifier.
    pub id: ServiceId,
    /// Routed service name.
    pub name: String,
}

/// Read access to the platform's users, roles and services.
#[async_trait]
pub trait LimitDirectory: Send + Sync {
    /// Resolves a service by its routed name.
    async fn find_service_by_name(&self, name: &str) -> AppResult<Option<ServiceRecord>>;

    /// Returns whether a user exists.
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool>;

    /// Returns whether a role exists.
    async fn role_exists(&self, role_id: RoleId) -> AppResult<bool>;

    /// Returns whether a service exists.
    async fn service_exists(&self, service_id: ServiceId) -> AppResult<bool>;

    /// Lists active users that are not system administrators.
    async fn list_active_non_admin_users(&self) -> AppResult<Vec<UserId>>;
}
