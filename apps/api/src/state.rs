use std::sync::Arc;

use limitgate_application::{
    CacheFailurePolicy, LimitAdminService, LimitCacheStore, LimitDirectory,
    LimitEvaluationService, LimitEventPublisher, LimitRepository,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limit_evaluation_service: LimitEvaluationService,
    pub limit_admin_service: LimitAdminService,
}

impl AppState {
    /// Wires both limit services over the same ports so evaluation and
    /// administration share counters.
    pub fn new(
        repository: Arc<dyn LimitRepository>,
        directory: Arc<dyn LimitDirectory>,
        cache: Arc<dyn LimitCacheStore>,
        events: Arc<dyn LimitEventPublisher>,
        failure_policy: CacheFailurePolicy,
    ) -> Self {
        Self {
            limit_evaluation_service: LimitEvaluationService::new(
                repository.clone(),
                directory.clone(),
                cache.clone(),
                events,
                failure_policy,
            ),
            limit_admin_service: LimitAdminService::new(repository, directory, cache),
        }
    }
}
