//! Per-request limit evaluation.
//!
//! Every active rule is checked independently. A rule applies to a request
//! when the key built from the stored rule equals the key built from the
//! request; matching rules either tick their counter or, when over their
//! rate, contribute a violation unless a more specific rule overrides them.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use limitgate_core::{AppError, AppResult, CallerIdentity};
use limitgate_domain::{
    HttpVerb, KeyParts, LimitId, LimitKey, LimitRule, RoleId, ServiceId, UserId, derive_resource,
};

use crate::limit_counter_store::{LimitCounterStore, ThrottleCheck};
use crate::limit_ports::{
    LimitCacheStore, LimitDirectory, LimitEventPublisher, LimitExceededEvent, LimitRepository,
};
use crate::override_index::OverrideIndex;

#[cfg(test)]
mod tests;

/// Behavior when the counter backend cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheFailurePolicy {
    /// Skip the affected rule and let the request through.
    #[default]
    FailOpen,
    /// Fail the evaluation with [`AppError::Unavailable`].
    FailClosed,
}

impl FromStr for CacheFailurePolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::FailOpen),
            "closed" => Ok(Self::FailClosed),
            other => Err(AppError::Validation(format!(
                "unknown cache failure policy '{other}', expected 'open' or 'closed'"
            ))),
        }
    }
}

/// Request attributes consumed by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitRequest {
    /// Caller identity resolved upstream.
    pub caller: CallerIdentity,
    /// Routed service name.
    pub service: Option<String>,
    /// Routed resource path below the service.
    pub resource: String,
    /// HTTP method.
    pub method: String,
}

/// Violated rule reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Rule identifier.
    pub id: LimitId,
    /// Rule display name.
    pub name: String,
}

/// Rate limit header values for a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Rate of the reported rule.
    pub limit: u32,
    /// Hits left on the reported rule.
    pub remaining: u32,
    /// Seconds until the reported lockout ends.
    pub retry_after: Option<u64>,
    /// Epoch second at which the reported lockout ends.
    pub reset_at: Option<i64>,
}

/// Outcome of evaluating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitDecision {
    /// The request may proceed.
    Allowed,
    /// At least one rule is over its rate.
    Throttled {
        /// Violated rules in evaluation order.
        violations: Vec<Violation>,
        /// Headers for the most restrictive violated rule.
        headers: RateLimitHeaders,
    },
}

impl LimitDecision {
    /// Returns whether the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the violated rules.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Allowed => &[],
            Self::Throttled { violations, .. } => violations,
        }
    }
}

struct Requester {
    user_id: Option<UserId>,
    role_id: Option<RoleId>,
    service_id: Option<ServiceId>,
    is_authenticated: bool,
}

struct ViolatedRule {
    violation: Violation,
    key: LimitKey,
    rate: u32,
}

/// Application service evaluating requests against active limit rules.
#[derive(Clone)]
pub struct LimitEvaluationService {
    repository: Arc<dyn LimitRepository>,
    directory: Arc<dyn LimitDirectory>,
    counters: LimitCounterStore,
    events: Arc<dyn LimitEventPublisher>,
    failure_policy: CacheFailurePolicy,
}

impl LimitEvaluationService {
    /// Creates a new evaluation service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn LimitRepository>,
        directory: Arc<dyn LimitDirectory>,
        cache: Arc<dyn LimitCacheStore>,
        events: Arc<dyn LimitEventPublisher>,
        failure_policy: CacheFailurePolicy,
    ) -> Self {
        Self {
            repository,
            directory,
            counters: LimitCounterStore::new(cache),
            events,
            failure_policy,
        }
    }

    /// Evaluates a request against every active rule.
    ///
    /// Administrators are exempt and cause no lookups or counter writes.
    /// When several rules are violated the headers describe the one with the
    /// longest remaining lockout, the lower rate winning ties.
    pub async fn evaluate(&self, request: &LimitRequest) -> AppResult<LimitDecision> {
        if request.caller.is_admin() {
            return Ok(LimitDecision::Allowed);
        }

        let service_id = match request.service.as_deref() {
            Some(name) => self
                .directory
                .find_service_by_name(name)
                .await?
                .map(|service| service.id),
            None => None,
        };
        if service_id.is_none() {
            debug!(service = ?request.service, "routed service not found, service scoped rules will not match");
        }

        let rules = self.repository.list_active_limits().await?;
        let index = OverrideIndex::build(&rules);
        let requester = Requester {
            user_id: request.caller.user_id().map(UserId::new),
            role_id: request.caller.role_id().map(RoleId::new),
            service_id,
            is_authenticated: request.caller.is_authenticated(),
        };

        let mut violated = Vec::new();
        for rule in &rules {
            match self.evaluate_rule(request, &requester, rule, &index).await {
                Ok(Some(entry)) => violated.push(entry),
                Ok(None) => {}
                Err(error) if error.is_unavailable() => match self.failure_policy {
                    CacheFailurePolicy::FailOpen => {
                        warn!(limit_id = %rule.id, %error, "limit cache unavailable, failing open");
                    }
                    CacheFailurePolicy::FailClosed => return Err(error),
                },
                Err(error) => {
                    warn!(limit_id = %rule.id, %error, "skipping limit after evaluation failure");
                }
            }
        }

        if violated.is_empty() {
            return Ok(LimitDecision::Allowed);
        }

        let headers = self.headers_for(&violated).await;
        Ok(LimitDecision::Throttled {
            violations: violated.into_iter().map(|entry| entry.violation).collect(),
            headers,
        })
    }

    async fn evaluate_rule(
        &self,
        request: &LimitRequest,
        requester: &Requester,
        rule: &LimitRule,
        index: &OverrideIndex<'_>,
    ) -> AppResult<Option<ViolatedRule>> {
        let is_each_user = rule.limit_type.is_each_user();
        let method_verb = rule.verb.map(|_| request.method.to_ascii_uppercase());
        let derived_resource = derive_resource(&request.resource, rule.endpoint.as_deref());

        let rule_key = check_key(rule, requester.user_id, rule.verb.as_ref().map(HttpVerb::as_str));
        let request_key = derived_key(rule, requester, &derived_resource, method_verb.as_deref());

        if rule_key != request_key {
            return Ok(None);
        }
        if is_each_user && !requester.is_authenticated {
            return Ok(None);
        }

        let override_verb = rule.verb.is_none()
            && index.verb_rules().iter().any(|verb_rule| {
                verb_rule.id != rule.id
                    && verb_rule
                        .verb
                        .is_some_and(|verb| verb.matches_method(&request.method))
                    && rule_key == check_key(verb_rule, requester.user_id, None)
                    && request_key
                        == derived_key(
                            verb_rule,
                            requester,
                            &derive_resource(&request.resource, verb_rule.endpoint.as_deref()),
                            None,
                        )
            });

        let minutes = rule.period.minutes();
        match self
            .counters
            .too_many_attempts(&rule_key, rule.rate, minutes)
            .await?
        {
            ThrottleCheck::UnderLimit => {
                self.counters.hit(&rule_key, minutes).await?;
                return Ok(None);
            }
            ThrottleCheck::LockoutStarted => {
                info!(limit_id = %rule.id, cache_key = %rule_key, "limit exceeded, lockout started");
                self.publish_exceeded(request, requester, rule, &rule_key)
                    .await;
            }
            ThrottleCheck::LockedOut => {}
        }

        if index.suppresses(rule, requester.user_id) {
            debug!(limit_id = %rule.id, "each-user limit overridden by user specific limit");
            return Ok(None);
        }
        if override_verb {
            debug!(limit_id = %rule.id, "limit overridden by verb specific limit");
            return Ok(None);
        }

        Ok(Some(ViolatedRule {
            violation: Violation {
                id: rule.id,
                name: rule.name.clone(),
            },
            key: rule_key,
            rate: rule.rate,
        }))
    }

    async fn publish_exceeded(
        &self,
        request: &LimitRequest,
        requester: &Requester,
        rule: &LimitRule,
        key: &LimitKey,
    ) {
        let event = LimitExceededEvent {
            limit_id: rule.id,
            limit_name: rule.name.clone(),
            rate: rule.rate,
            period: rule.period.name(),
            cache_key: key.to_string(),
            service: request.service.clone(),
            resource: request.resource.clone(),
            method: request.method.to_ascii_uppercase(),
            user_id: requester.user_id,
        };

        for name in event.names() {
            if let Err(error) = self.events.publish(&name, &event).await {
                warn!(event = %name, %error, "failed to publish limit event");
            }
        }
    }

    async fn headers_for(&self, violated: &[ViolatedRule]) -> RateLimitHeaders {
        let mut reported: Option<(u64, u32, &ViolatedRule)> = None;
        for entry in violated {
            let retry_after = match self.counters.available_in(&entry.key).await {
                Ok(retry_after) => retry_after.unwrap_or(0),
                Err(error) => {
                    warn!(cache_key = %entry.key, %error, "failed to read lockout expiry");
                    0
                }
            };

            let replace = match reported {
                None => true,
                Some((best_retry, best_rate, _)) => {
                    retry_after > best_retry || (retry_after == best_retry && entry.rate < best_rate)
                }
            };
            if replace {
                reported = Some((retry_after, entry.rate, entry));
            }
        }

        let Some((retry_after, rate, entry)) = reported else {
            return RateLimitHeaders {
                limit: 0,
                remaining: 0,
                retry_after: None,
                reset_at: None,
            };
        };

        let remaining = match self.counters.retries_left(&entry.key, rate).await {
            Ok(remaining) => remaining,
            Err(error) => {
                warn!(cache_key = %entry.key, %error, "failed to read remaining attempts");
                0
            }
        };
        let retry_after = (retry_after > 0).then_some(retry_after);
        let reset_at = retry_after.map(|seconds| {
            Utc::now()
                .timestamp()
                .saturating_add(i64::try_from(seconds).unwrap_or(i64::MAX))
        });

        RateLimitHeaders {
            limit: rate,
            remaining,
            retry_after,
            reset_at,
        }
    }
}

/// Key built from the stored rule, with the requesting user standing in for
/// each-user rules.
fn check_key(rule: &LimitRule, requester: Option<UserId>, verb: Option<&str>) -> LimitKey {
    let user_id = match rule.user_id {
        None if rule.limit_type.is_each_user() => requester,
        stored => stored,
    };

    LimitKey::resolve(
        rule.limit_type,
        &KeyParts {
            user_id,
            role_id: rule.role_id,
            service_id: rule.service_id,
            endpoint: rule.endpoint.as_deref(),
            verb,
        },
        rule.period,
    )
}

/// Key built from the request at the rule's scope type and period.
fn derived_key(
    rule: &LimitRule,
    requester: &Requester,
    resource: &str,
    verb: Option<&str>,
) -> LimitKey {
    LimitKey::resolve(
        rule.limit_type,
        &KeyParts {
            user_id: requester.user_id,
            role_id: requester.role_id,
            service_id: requester.service_id,
            endpoint: Some(resource),
            verb,
        },
        rule.period,
    )
}
