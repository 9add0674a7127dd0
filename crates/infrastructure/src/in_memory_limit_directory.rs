use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use limitgate_application::{LimitDirectory, ServiceRecord};
use limitgate_core::AppResult;
use limitgate_domain::{RoleId, ServiceId, UserId};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct DirectoryState {
    users: BTreeMap<UserId, bool>,
    roles: BTreeSet<RoleId>,
    services: BTreeMap<String, ServiceId>,
}

/// In-memory directory of users, roles and services.
#[derive(Debug, Default)]
pub struct InMemoryLimitDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryLimitDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an active user.
    pub async fn add_user(&self, user_id: UserId, is_admin: bool) {
        self.state.write().await.users.insert(user_id, is_admin);
    }

    /// Registers a role.
    pub async fn add_role(&self, role_id: RoleId) {
        self.state.write().await.roles.insert(role_id);
    }

    /// Registers a routed service.
    pub async fn add_service(&self, service_id: ServiceId, name: impl Into<String>) {
        self.state
            .write()
            .await
            .services
            .insert(name.into(), service_id);
    }

    /// Removes a user.
    pub async fn remove_user(&self, user_id: UserId) {
        self.state.write().await.users.remove(&user_id);
    }
}

#[async_trait]
impl LimitDirectory for InMemoryLimitDirectory {
    async fn find_service_by_name(&self, name: &str) -> AppResult<Option<ServiceRecord>> {
        Ok(self
            .state
            .read()
            .await
            .services
            .get(name)
            .map(|service_id| ServiceRecord {
                id: *service_id,
                name: name.to_owned(),
            }))
    }

    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        Ok(self.state.read().await.users.contains_key(&user_id))
    }

    async fn role_exists(&self, role_id: RoleId) -> AppResult<bool> {
        Ok(self.state.read().await.roles.contains(&role_id))
    }

    async fn service_exists(&self, service_id: ServiceId) -> AppResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .services
            .values()
            .any(|id| *id == service_id))
    }

    async fn list_active_non_admin_users(&self) -> AppResult<Vec<UserId>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .iter()
            .filter(|(_, is_admin)| !**is_admin)
            .map(|(user_id, _)| *user_id)
            .collect())
    }
}
