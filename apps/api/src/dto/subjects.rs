use limitgate_application::SubjectRef;
use limitgate_domain::{RoleId, ServiceId, UserId};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Kind of record whose deletion cascades to limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/subject-kind.ts"
)]
pub enum SubjectKind {
    User,
    Role,
    Service,
}

/// Notification that a user, role or service was deleted.
#[derive(Debug, Clone, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/subject-deleted-request.ts"
)]
pub struct SubjectDeletedRequest {
    pub kind: SubjectKind,
    pub id: i64,
}

impl From<SubjectDeletedRequest> for SubjectRef {
    fn from(request: SubjectDeletedRequest) -> Self {
        match request.kind {
            SubjectKind::User => Self::User(UserId::new(request.id)),
            SubjectKind::Role => Self::Role(RoleId::new(request.id)),
            SubjectKind::Service => Self::Service(ServiceId::new(request.id)),
        }
    }
}

/// Limits removed by the cascade.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/subject-deleted-response.ts"
)]
pub struct SubjectDeletedResponse {
    pub removed: Vec<i64>,
}
