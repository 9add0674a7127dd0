use async_trait::async_trait;
use limitgate_application::{LimitEventPublisher, LimitExceededEvent};
use limitgate_core::AppResult;
use tracing::warn;

/// Limit event publisher that writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLimitEventPublisher;

impl TracingLimitEventPublisher {
    /// Creates a new publisher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LimitEventPublisher for TracingLimitEventPublisher {
    async fn publish(&self, name: &str, event: &LimitExceededEvent) -> AppResult<()> {
        warn!(
            event = name,
            limit_id = %event.limit_id,
            limit_name = %event.limit_name,
            rate = event.rate,
            period = event.period,
            cache_key = %event.cache_key,
            service = ?event.service,
            resource = %event.resource,
            method = %event.method,
            user_id = ?event.user_id,
            "limit exceeded"
        );
        Ok(())
    }
}
