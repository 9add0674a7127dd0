use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use limitgate_core::{AppError, AppResult};
use limitgate_domain::{LimitDraft, LimitId, LimitRule, RoleId, ServiceId, UserId};

use crate::limit_ports::{
    LimitCacheStore, LimitDirectory, LimitEventPublisher, LimitExceededEvent, LimitRepository,
    ServiceRecord, SubjectRef,
};

#[derive(Default)]
struct FakeCacheState {
    now: u64,
    entries: HashMap<String, (i64, u64)>,
    unavailable: bool,
    writes: usize,
}

impl FakeCacheState {
    fn purge(&mut self) {
        let now = self.now;
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    fn check(&self) -> AppResult<()> {
        if self.unavailable {
            return Err(AppError::Unavailable("cache offline".to_owned()));
        }
        Ok(())
    }
}

/// Cache store with a manually advanced clock.
#[derive(Default)]
pub struct FakeLimitCacheStore {
    state: Mutex<FakeCacheState>,
}

impl FakeLimitCacheStore {
    pub async fn advance_seconds(&self, seconds: u64) {
        let mut state = self.state.lock().await;
        state.now += seconds;
        state.purge();
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub async fn writes(&self) -> usize {
        self.state.lock().await.writes
    }

    pub async fn value(&self, key: &str) -> Option<i64> {
        let mut state = self.state.lock().await;
        state.purge();
        state.entries.get(key).map(|(value, _)| *value)
    }

    pub async fn put(&self, key: &str, value: i64, ttl_seconds: u64) {
        let mut state = self.state.lock().await;
        let expires_at = state.now + ttl_seconds;
        state.entries.insert(key.to_owned(), (value, expires_at));
    }
}

#[async_trait]
impl LimitCacheStore for FakeLimitCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<i64>> {
        let mut state = self.state.lock().await;
        state.check()?;
        state.purge();
        Ok(state.entries.get(key).map(|(value, _)| *value))
    }

    async fn add(&self, key: &str, value: i64, ttl_seconds: u64) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        state.check()?;
        state.purge();
        if state.entries.contains_key(key) {
            return Ok(false);
        }
        let expires_at = state.now + ttl_seconds;
        state.entries.insert(key.to_owned(), (value, expires_at));
        state.writes += 1;
        Ok(true)
    }

    async fn increment(&self, key: &str, ttl_seconds: u64) -> AppResult<i64> {
        let mut state = self.state.lock().await;
        state.check()?;
        state.purge();
        let expires_at = state.now + ttl_seconds;
        let entry = state
            .entries
            .entry(key.to_owned())
            .or_insert((0, expires_at));
        entry.0 += 1;
        let value = entry.0;
        state.writes += 1;
        Ok(value)
    }

    async fn forget(&self, key: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        state.check()?;
        state.writes += 1;
        Ok(state.entries.remove(key).is_some())
    }

    async fn flush(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.check()?;
        state.entries.clear();
        state.writes += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLimitRepository {
    limits: Mutex<Vec<LimitRule>>,
    list_calls: Mutex<usize>,
}

impl FakeLimitRepository {
    pub async fn seed(&self, drafts: Vec<LimitDraft>) -> Vec<LimitRule> {
        let mut created = Vec::new();
        for draft in drafts {
            if let Ok(rule) = self.create_limit(draft).await {
                created.push(rule);
            }
        }
        created
    }

    pub async fn list_calls(&self) -> usize {
        *self.list_calls.lock().await
    }

    pub async fn all(&self) -> Vec<LimitRule> {
        self.limits.lock().await.clone()
    }
}

#[async_trait]
impl LimitRepository for FakeLimitRepository {
    async fn list_limits(&self) -> AppResult<Vec<LimitRule>> {
        *self.list_calls.lock().await += 1;
        Ok(self.limits.lock().await.clone())
    }

    async fn list_active_limits(&self) -> AppResult<Vec<LimitRule>> {
        *self.list_calls.lock().await += 1;
        Ok(self
            .limits
            .lock()
            .await
            .iter()
            .filter(|rule| rule.is_active)
            .cloned()
            .collect())
    }

    async fn find_limit(&self, limit_id: LimitId) -> AppResult<Option<LimitRule>> {
        Ok(self
            .limits
            .lock()
            .await
            .iter()
            .find(|rule| rule.id == limit_id)
            .cloned())
    }

    async fn list_limits_for_subject(&self, subject: SubjectRef) -> AppResult<Vec<LimitRule>> {
        Ok(self
            .limits
            .lock()
            .await
            .iter()
            .filter(|rule| match subject {
                SubjectRef::User(user_id) => rule.user_id == Some(user_id),
                SubjectRef::Role(role_id) => rule.role_id == Some(role_id),
                SubjectRef::Service(service_id) => rule.service_id == Some(service_id),
            })
            .cloned()
            .collect())
    }

    async fn key_exists(&self, key_text: &str) -> AppResult<bool> {
        Ok(self
            .limits
            .lock()
            .await
            .iter()
            .any(|rule| rule.key_text == key_text))
    }

    async fn create_limit(&self, draft: LimitDraft) -> AppResult<LimitRule> {
        let mut limits = self.limits.lock().await;
        if limits
            .iter()
            .any(|rule| rule.key_text == draft.key_text().as_str())
        {
            return Err(AppError::Conflict(format!(
                "limit key '{}' already exists",
                draft.key_text()
            )));
        }

        let next_id = limits
            .iter()
            .map(|rule| rule.id.as_i64())
            .max()
            .unwrap_or(0)
            + 1;
        let rule = LimitRule::from_draft(LimitId::new(next_id), draft, Utc::now());
        limits.push(rule.clone());
        Ok(rule)
    }

    async fn update_limit(&self, limit_id: LimitId, draft: LimitDraft) -> AppResult<LimitRule> {
        let mut limits = self.limits.lock().await;
        let position = limits
            .iter()
            .position(|rule| rule.id == limit_id)
            .ok_or_else(|| AppError::NotFound(format!("limit '{limit_id}' not found")))?;

        let created_at = limits[position].created_at;
        let mut rule = LimitRule::from_draft(limit_id, draft, Utc::now());
        rule.created_at = created_at;
        limits[position] = rule.clone();
        Ok(rule)
    }

    async fn delete_limit(&self, limit_id: LimitId) -> AppResult<()> {
        let mut limits = self.limits.lock().await;
        let before = limits.len();
        limits.retain(|rule| rule.id != limit_id);
        if limits.len() == before {
            return Err(AppError::NotFound(format!("limit '{limit_id}' not found")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLimitDirectory {
    pub users: HashSet<UserId>,
    pub admins: HashSet<UserId>,
    pub roles: HashSet<RoleId>,
    pub services: HashMap<String, ServiceId>,
}

impl FakeLimitDirectory {
    pub fn with_service(mut self, name: &str, service_id: i64) -> Self {
        self.services
            .insert(name.to_owned(), ServiceId::new(service_id));
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.users.insert(UserId::new(user_id));
        self
    }

    pub fn with_role(mut self, role_id: i64) -> Self {
        self.roles.insert(RoleId::new(role_id));
        self
    }
}

#[async_trait]
impl LimitDirectory for FakeLimitDirectory {
    async fn find_service_by_name(&self, name: &str) -> AppResult<Option<ServiceRecord>> {
        Ok(self.services.get(name).map(|service_id| ServiceRecord {
            id: *service_id,
            name: name.to_owned(),
        }))
    }

    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        Ok(self.users.contains(&user_id))
    }

    async fn role_exists(&self, role_id: RoleId) -> AppResult<bool> {
        Ok(self.roles.contains(&role_id))
    }

    async fn service_exists(&self, service_id: ServiceId) -> AppResult<bool> {
        Ok(self.services.values().any(|id| *id == service_id))
    }

    async fn list_active_non_admin_users(&self) -> AppResult<Vec<UserId>> {
        let mut users: Vec<UserId> = self
            .users
            .iter()
            .filter(|user_id| !self.admins.contains(user_id))
            .copied()
            .collect();
        users.sort();
        Ok(users)
    }
}

#[derive(Default)]
pub struct RecordingEventPublisher {
    pub published: Mutex<Vec<(String, LimitExceededEvent)>>,
}

#[async_trait]
impl LimitEventPublisher for RecordingEventPublisher {
    async fn publish(&self, name: &str, event: &LimitExceededEvent) -> AppResult<()> {
        self.published
            .lock()
            .await
            .push((name.to_owned(), event.clone()));
        Ok(())
    }
}
