use limitgate_core::{AppError, AppResult};
use limitgate_domain::{LimitId, LimitKey, LimitRule};
use tracing::info;

use super::LimitAdminService;

/// Counter state of one cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Rule identifier.
    pub id: LimitId,
    /// Counter key.
    pub key: String,
    /// Rule rate.
    pub max: u32,
    /// Hits counted in the current window.
    pub attempts: i64,
    /// Hits left before lockout.
    pub remaining: u32,
}

/// Policy for bulk operations over several rule identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Attempt every identifier and collect failures.
    ContinueOnError,
    /// Stop at the first failing identifier.
    #[default]
    StopOnFirstError,
}

impl BatchMode {
    /// Maps a `continue` flag to a mode.
    #[must_use]
    pub fn from_continue_flag(continue_on_error: bool) -> Self {
        if continue_on_error {
            Self::ContinueOnError
        } else {
            Self::StopOnFirstError
        }
    }
}

/// Outcome for one identifier of a bulk operation.
#[derive(Debug)]
pub struct BatchItem<T> {
    /// Requested identifier.
    pub id: LimitId,
    /// Result for that identifier.
    pub outcome: AppResult<T>,
}

/// Per-identifier outcomes of a bulk operation, in request order.
///
/// Identifiers after the first failure are absent when the batch stopped early.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Attempted identifiers.
    pub items: Vec<BatchItem<T>>,
}

impl<T> BatchReport<T> {
    /// Returns whether every attempted identifier succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.items.iter().all(|item| item.outcome.is_ok())
    }

    /// Returns the identifiers that failed.
    #[must_use]
    pub fn failed_ids(&self) -> Vec<LimitId> {
        self.items
            .iter()
            .filter(|item| item.outcome.is_err())
            .map(|item| item.id)
            .collect()
    }
}

impl LimitAdminService {
    /// Returns counter snapshots for one rule.
    ///
    /// Each-user rules report one snapshot per active non-admin user.
    pub async fn limit_counters(&self, limit_id: LimitId) -> AppResult<Vec<CounterSnapshot>> {
        let rule = self.find_existing(limit_id).await?;
        self.snapshots_for(&rule).await
    }

    /// Returns counter snapshots for every rule.
    pub async fn all_counters(&self) -> AppResult<Vec<CounterSnapshot>> {
        let mut snapshots = Vec::new();
        for rule in self.repository.list_limits().await? {
            snapshots.extend(self.snapshots_for(&rule).await?);
        }
        Ok(snapshots)
    }

    /// Returns counter snapshots for several rules.
    pub async fn counters_for_limits(
        &self,
        limit_ids: &[LimitId],
        mode: BatchMode,
    ) -> BatchReport<Vec<CounterSnapshot>> {
        let mut items = Vec::with_capacity(limit_ids.len());
        for limit_id in limit_ids {
            let outcome = self.limit_counters(*limit_id).await;
            let failed = outcome.is_err();
            items.push(BatchItem {
                id: *limit_id,
                outcome,
            });
            if failed && mode == BatchMode::StopOnFirstError {
                break;
            }
        }
        BatchReport { items }
    }

    /// Clears every counter of one rule.
    pub async fn clear_counters(&self, limit_id: LimitId) -> AppResult<LimitId> {
        let rule = self.find_existing(limit_id).await?;
        self.clear_rule_counters(&rule).await?;

        info!(limit_id = %limit_id, "cleared limit counters");
        Ok(limit_id)
    }

    /// Clears the counters of several rules.
    pub async fn clear_counters_for_limits(
        &self,
        limit_ids: &[LimitId],
        mode: BatchMode,
    ) -> BatchReport<LimitId> {
        let mut items = Vec::with_capacity(limit_ids.len());
        for limit_id in limit_ids {
            let outcome = self.clear_counters(*limit_id).await;
            let failed = outcome.is_err();
            items.push(BatchItem {
                id: *limit_id,
                outcome,
            });
            if failed && mode == BatchMode::StopOnFirstError {
                break;
            }
        }
        BatchReport { items }
    }

    /// Clears every counter and lockout. Requires explicit confirmation.
    pub async fn clear_all_counters(&self, confirmed: bool) -> AppResult<()> {
        if !confirmed {
            return Err(AppError::Validation(
                "clearing all limit counters requires the 'force' flag".to_owned(),
            ));
        }

        self.counters.flush().await?;
        info!("cleared all limit counters");
        Ok(())
    }

    pub(super) async fn clear_rule_counters(&self, rule: &LimitRule) -> AppResult<()> {
        for key in self.rule_keys(rule).await? {
            self.counters.clear(&key).await?;
        }
        Ok(())
    }

    pub(super) async fn rule_keys(&self, rule: &LimitRule) -> AppResult<Vec<LimitKey>> {
        if !rule.limit_type.is_each_user() {
            return Ok(vec![rule.key_for_user(None)]);
        }

        Ok(self
            .directory
            .list_active_non_admin_users()
            .await?
            .into_iter()
            .map(|user_id| rule.key_for_user(Some(user_id)))
            .collect())
    }

    async fn snapshots_for(&self, rule: &LimitRule) -> AppResult<Vec<CounterSnapshot>> {
        let mut snapshots = Vec::new();
        for key in self.rule_keys(rule).await? {
            let attempts = self.counters.reported_attempts(&key, rule.rate).await?;
            let remaining = self.counters.retries_left(&key, rule.rate).await?;
            snapshots.push(CounterSnapshot {
                id: rule.id,
                key: key.to_string(),
                max: rule.rate,
                attempts,
                remaining,
            });
        }
        Ok(snapshots)
    }
}
