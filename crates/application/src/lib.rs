//! Application services and ports.

#![forbid(unsafe_code)]

mod limit_admin_service;
mod limit_counter_store;
mod limit_evaluation_service;
mod limit_ports;
mod override_index;

#[cfg(test)]
mod test_support;

pub use limit_admin_service::{
    BatchItem, BatchMode, BatchReport, CounterSnapshot, CreateLimitsOptions, LimitAdminService,
    LimitPatch,
};
pub use limit_counter_store::{LimitCounterStore, ThrottleCheck};
pub use limit_evaluation_service::{
    CacheFailurePolicy, LimitDecision, LimitEvaluationService, LimitRequest, RateLimitHeaders,
    Violation,
};
pub use limit_ports::{
    LimitCacheStore, LimitDirectory, LimitEventPublisher, LimitExceededEvent, LimitRepository,
    ServiceRecord, SubjectRef,
};
pub use override_index::OverrideIndex;
