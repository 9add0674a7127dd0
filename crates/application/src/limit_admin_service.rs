//! Limit rule administration.
//!
//! Rules are validated against their scope type, checked against the
//! directory for the users, roles and services they name, and keyed through
//! the same resolver the evaluator uses so stored keys stay unique.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use limitgate_core::{AppError, AppResult};
use limitgate_domain::{
    LimitDraft, LimitId, LimitInput, LimitPeriod, LimitRule, LimitType, RoleId, ServiceId, UserId,
};

use crate::limit_counter_store::LimitCounterStore;
use crate::limit_ports::{LimitCacheStore, LimitDirectory, LimitRepository, SubjectRef};

mod counters;


pub use counters::{BatchItem, BatchMode, BatchReport, CounterSnapshot};

/// Options for creating rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateLimitsOptions {
    /// Skips the duplicate-key pre-check and undoes already created rules
    /// when a later one fails.
    pub rollback: bool,
}

/// Partial update merged over a stored rule.
///
/// Nullable fields use a nested option: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitPatch {
    /// New scope type.
    pub limit_type: Option<LimitType>,
    /// New scoped user.
    pub user_id: Option<Option<UserId>>,
    /// New scoped role.
    pub role_id: Option<Option<RoleId>>,
    /// New scoped service.
    pub service_id: Option<Option<ServiceId>>,
    /// New endpoint.
    pub endpoint: Option<Option<String>>,
    /// New verb restriction.
    pub verb: Option<Option<String>>,
    /// New rate.
    pub rate: Option<i64>,
    /// New period.
    pub period: Option<LimitPeriod>,
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<Option<String>>,
    /// New active flag.
    pub is_active: Option<bool>,
}

impl LimitPatch {
    /// Merges the patch over an input.
    #[must_use]
    pub fn apply(self, mut input: LimitInput) -> LimitInput {
        if let Some(limit_type) = self.limit_type {
            input.limit_type = limit_type;
        }
        if let Some(user_id) = self.user_id {
            input.user_id = user_id;
        }
        if let Some(role_id) = self.role_id {
            input.role_id = role_id;
        }
        if let Some(service_id) = self.service_id {
            input.service_id = service_id;
        }
        if let Some(endpoint) = self.endpoint {
            input.endpoint = endpoint;
        }
        if let Some(verb) = self.verb {
            input.verb = verb;
        }
        if let Some(rate) = self.rate {
            input.rate = rate;
        }
        if let Some(period) = self.period {
            input.period = period;
        }
        if let Some(name) = self.name {
            input.name = name;
        }
        if let Some(description) = self.description {
            input.description = description;
        }
        if let Some(is_active) = self.is_active {
            input.is_active = is_active;
        }
        input
    }
}

impl From<LimitInput> for LimitPatch {
    fn from(input: LimitInput) -> Self {
        Self {
            limit_type: Some(input.limit_type),
            user_id: Some(input.user_id),
            role_id: Some(input.role_id),
            service_id: Some(input.service_id),
            endpoint: Some(input.endpoint),
            verb: Some(input.verb),
            rate: Some(input.rate),
            period: Some(input.period),
            name: Some(input.name),
            description: Some(input.description),
            is_active: Some(input.is_active),
        }
    }
}

/// Application service for limit rule administration.
#[derive(Clone)]
pub struct LimitAdminService {
    repository: Arc<dyn LimitRepository>,
    directory: Arc<dyn LimitDirectory>,
    counters: LimitCounterStore,
}

impl LimitAdminService {
    /// Creates a new administration service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn LimitRepository>,
        directory: Arc<dyn LimitDirectory>,
        cache: Arc<dyn LimitCacheStore>,
    ) -> Self {
        Self {
            repository,
            directory,
            counters: LimitCounterStore::new(cache),
        }
    }

    /// Lists every rule.
    pub async fn list_limits(&self) -> AppResult<Vec<LimitRule>> {
        self.repository.list_limits().await
    }

    /// Returns one rule.
    pub async fn get_limit(&self, limit_id: LimitId) -> AppResult<LimitRule> {
        self.find_existing(limit_id).await
    }

    /// Lists the identifiers of active rules, for event subscriptions.
    pub async fn active_limit_ids(&self) -> AppResult<Vec<LimitId>> {
        Ok(self
            .repository
            .list_active_limits()
            .await?
            .into_iter()
            .map(|rule| rule.id)
            .collect())
    }

    /// Creates one rule.
    pub async fn create_limit(&self, input: LimitInput) -> AppResult<LimitRule> {
        let mut created = self
            .create_limits(vec![input], CreateLimitsOptions::default())
            .await?;
        created
            .pop()
            .ok_or_else(|| AppError::Internal("limit creation returned no record".to_owned()))
    }

    /// Creates a batch of rules.
    ///
    /// Every record is validated before anything is written. Unless rollback
    /// is requested, the whole batch is rejected when any key is already in
    /// use or repeats within the batch.
    pub async fn create_limits(
        &self,
        inputs: Vec<LimitInput>,
        options: CreateLimitsOptions,
    ) -> AppResult<Vec<LimitRule>> {
        if inputs.is_empty() {
            return Err(AppError::Validation(
                "at least one limit record is required".to_owned(),
            ));
        }

        let mut drafts = Vec::with_capacity(inputs.len());
        for input in inputs {
            drafts.push(self.prepare(input).await?);
        }

        if !options.rollback {
            let mut seen = HashSet::new();
            for draft in &drafts {
                let key = draft.key_text().as_str();
                if !seen.insert(key.to_owned()) || self.repository.key_exists(key).await? {
                    return Err(duplicate_key_error(draft));
                }
            }
        }

        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match self.repository.create_limit(draft).await {
                Ok(rule) => created.push(rule),
                Err(error) => {
                    if options.rollback {
                        self.undo_created(&created).await;
                    }
                    return Err(error);
                }
            }
        }

        info!(count = created.len(), "created limits");
        Ok(created)
    }

    /// Merges a patch over a stored rule.
    ///
    /// A rate change on an unchanged key clears any active lockout so the
    /// new rate applies immediately. A changed key must stay unique.
    pub async fn update_limit(&self, limit_id: LimitId, patch: LimitPatch) -> AppResult<LimitRule> {
        let existing = self.find_existing(limit_id).await?;
        let draft = self.prepare(patch.apply(existing.to_input())).await?;
        if self.takes_new_key(&existing, &draft).await? {
            return Err(duplicate_key_error(&draft));
        }

        self.commit_update(existing, draft).await
    }

    /// Applies one patch to several rules. Unknown identifiers are skipped.
    ///
    /// Every merged rule is validated and checked for key collisions, within
    /// the batch and against stored rules, before any of them is written.
    pub async fn update_limits(
        &self,
        limit_ids: &[LimitId],
        patch: LimitPatch,
    ) -> AppResult<Vec<LimitRule>> {
        let mut planned = Vec::with_capacity(limit_ids.len());
        let mut seen = HashSet::new();
        for limit_id in limit_ids {
            let Some(existing) = self.repository.find_limit(*limit_id).await? else {
                continue;
            };
            let draft = self.prepare(patch.clone().apply(existing.to_input())).await?;
            if !seen.insert(draft.key_text().as_str().to_owned())
                || self.takes_new_key(&existing, &draft).await?
            {
                return Err(duplicate_key_error(&draft));
            }
            planned.push((existing, draft));
        }

        let mut updated = Vec::with_capacity(planned.len());
        for (existing, draft) in planned {
            updated.push(self.commit_update(existing, draft).await?);
        }
        Ok(updated)
    }

    /// Clears a rule's counters and deletes it.
    pub async fn delete_limit(&self, limit_id: LimitId) -> AppResult<LimitRule> {
        let existing = self.find_existing(limit_id).await?;
        self.clear_rule_counters(&existing).await?;
        self.repository.delete_limit(limit_id).await?;

        info!(limit_id = %limit_id, "deleted limit");
        Ok(existing)
    }

    /// Deletes several rules. Unknown identifiers are skipped.
    pub async fn delete_limits(&self, limit_ids: &[LimitId]) -> AppResult<Vec<LimitRule>> {
        let mut deleted = Vec::with_capacity(limit_ids.len());
        for limit_id in limit_ids {
            match self.delete_limit(*limit_id).await {
                Ok(rule) => deleted.push(rule),
                Err(error) if error.is_not_found() => {}
                Err(error) => return Err(error),
            }
        }
        Ok(deleted)
    }

    /// Removes every rule scoped to a deleted user, role or service.
    ///
    /// Counter cleanup is best effort; records already gone are ignored.
    pub async fn handle_subject_deleted(&self, subject: SubjectRef) -> AppResult<Vec<LimitId>> {
        let rules = self.repository.list_limits_for_subject(subject).await?;
        let mut removed = Vec::with_capacity(rules.len());

        for rule in rules {
            if let Err(error) = self.clear_rule_counters(&rule).await {
                warn!(limit_id = %rule.id, %error, "failed to clear counters of cascaded limit");
            }
            match self.repository.delete_limit(rule.id).await {
                Ok(()) => removed.push(rule.id),
                Err(error) if error.is_not_found() => {}
                Err(error) => return Err(error),
            }
        }

        info!(?subject, count = removed.len(), "removed limits of deleted subject");
        Ok(removed)
    }

    async fn find_existing(&self, limit_id: LimitId) -> AppResult<LimitRule> {
        self.repository
            .find_limit(limit_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("limit '{limit_id}' not found")))
    }

    async fn prepare(&self, input: LimitInput) -> AppResult<LimitDraft> {
        let draft = LimitDraft::from_input(input)?;

        if let Some(user_id) = draft.user_id()
            && !self.directory.user_exists(user_id).await?
        {
            return Err(AppError::Validation(format!(
                "user_id {user_id} does not exist. Limit: {}",
                draft.name()
            )));
        }
        if let Some(role_id) = draft.role_id()
            && !self.directory.role_exists(role_id).await?
        {
            return Err(AppError::Validation(format!(
                "role_id {role_id} does not exist. Limit: {}",
                draft.name()
            )));
        }
        if let Some(service_id) = draft.service_id()
            && !self.directory.service_exists(service_id).await?
        {
            return Err(AppError::Validation(format!(
                "service_id {service_id} does not exist. Limit: {}",
                draft.name()
            )));
        }

        Ok(draft)
    }

    async fn takes_new_key(&self, existing: &LimitRule, draft: &LimitDraft) -> AppResult<bool> {
        let key = draft.key_text().as_str();
        if key == existing.key_text {
            return Ok(false);
        }
        self.repository.key_exists(key).await
    }

    async fn commit_update(&self, existing: LimitRule, draft: LimitDraft) -> AppResult<LimitRule> {
        if draft.key_text().as_str() == existing.key_text && draft.rate() != existing.rate {
            self.unlock_after_rate_change(&existing).await?;
        }
        self.repository.update_limit(existing.id, draft).await
    }

    async fn unlock_after_rate_change(&self, rule: &LimitRule) -> AppResult<()> {
        for key in self.rule_keys(rule).await? {
            if self.counters.has_lockout(&key).await? {
                info!(limit_id = %rule.id, "rate changed on locked out limit, clearing counters");
                return self.clear_rule_counters(rule).await;
            }
        }
        Ok(())
    }

    async fn undo_created(&self, created: &[LimitRule]) {
        for rule in created {
            if let Err(error) = self.repository.delete_limit(rule.id).await {
                warn!(limit_id = %rule.id, %error, "failed to roll back created limit");
            }
        }
    }
}

fn duplicate_key_error(draft: &LimitDraft) -> AppError {
    AppError::Conflict(format!(
        "a limit already exists with those parameters. Limit: {}",
        draft.name()
    ))
}
