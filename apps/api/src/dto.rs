mod common;
mod limit_cache;
mod limits;
mod subjects;

pub use common::{HealthResponse, PassthroughResponse, parse_limit_ids};
pub use limit_cache::{BatchReportResponse, CounterSnapshotResponse, LimitCacheQuery};
pub use limits::{
    CreateLimitsRequest, LimitEventsResponse, LimitPayload, LimitQuery, LimitResponse,
    PatchLimitRequest,
};
pub use subjects::{SubjectDeletedRequest, SubjectDeletedResponse};
