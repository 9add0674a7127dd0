use async_trait::async_trait;

use limitgate_core::AppResult;
use limitgate_domain::{LimitId, UserId};

/// Emitted once when a counter crosses its rate and a lockout begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitExceededEvent {
    /// Rule that was exceeded.
    pub limit_id: LimitId,
    /// Display name of the rule.
    pub limit_name: String,
    /// Allowed hits per period.
    pub rate: u32,
    /// Period name of the rule.
    pub period: &'static str,
    /// Counter key that crossed the rate.
    pub cache_key: String,
    /// Routed service name of the triggering request.
    pub service: Option<String>,
    /// Routed resource of the triggering request.
    pub resource: String,
    /// Method of the triggering request.
    pub method: String,
    /// Requesting user.
    pub user_id: Option<UserId>,
}

impl LimitExceededEvent {
    /// Generic subscription name shared by every rule.
    pub const GENERIC_NAME: &'static str = "system.limit.{id}.exceeded";

    /// Returns the rule-specific event name.
    #[must_use]
    pub fn specific_name(&self) -> String {
        format!("system.limit.{}.exceeded", self.limit_id)
    }

    /// Returns the names this event is published under.
    #[must_use]
    pub fn names(&self) -> [String; 2] {
        [Self::GENERIC_NAME.to_owned(), self.specific_name()]
    }
}

/// Outbound sink for limit notifications.
#[async_trait]
pub trait LimitEventPublisher: Send + Sync {
    /// Publishes an event under one name.
    async fn publish(&self, name: &str, event: &LimitExceededEvent) -> AppResult<()>;
}
