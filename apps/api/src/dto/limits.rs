use std::str::FromStr;

use limitgate_application::{CounterSnapshot, LimitPatch};
use limitgate_core::{AppError, AppResult};
use limitgate_domain::{LimitInput, LimitPeriod, LimitRule, LimitType, RoleId, ServiceId, UserId};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use super::limit_cache::CounterSnapshotResponse;

/// Period given either by index (`0`..`4`) or by name (`"hour"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, TS)]
#[serde(untagged)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/period-value.ts"
)]
pub enum PeriodValue {
    Index(i64),
    Name(String),
}

impl PeriodValue {
    pub fn resolve(&self) -> AppResult<LimitPeriod> {
        match self {
            Self::Index(index) => LimitPeriod::from_index(*index),
            Self::Name(name) => LimitPeriod::from_transport(name),
        }
    }
}

/// Incoming limit record.
#[derive(Debug, Clone, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/limit-payload.ts"
)]
pub struct LimitPayload {
    #[serde(rename = "type")]
    pub limit_type: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub role_id: Option<i64>,
    #[serde(default)]
    pub service_id: Option<i64>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub verb: Option<String>,
    pub rate: i64,
    pub period: PeriodValue,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl TryFrom<LimitPayload> for LimitInput {
    type Error = AppError;

    fn try_from(payload: LimitPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            limit_type: LimitType::from_str(payload.limit_type.trim())?,
            user_id: payload.user_id.map(UserId::new),
            role_id: payload.role_id.map(RoleId::new),
            service_id: payload.service_id.map(ServiceId::new),
            endpoint: payload.endpoint,
            verb: payload.verb,
            rate: payload.rate,
            period: payload.period.resolve()?,
            name: payload.name,
            description: payload.description,
            is_active: payload.is_active.unwrap_or(true),
        })
    }
}

/// Create body: one record, a bare list, or a `resource` wrapper.
#[derive(Debug, Clone, Deserialize, TS)]
#[serde(untagged)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/create-limits-request.ts"
)]
pub enum CreateLimitsRequest {
    Wrapped { resource: Vec<LimitPayload> },
    Many(Vec<LimitPayload>),
    One(LimitPayload),
}

impl CreateLimitsRequest {
    /// Returns the records and whether the caller sent a batch.
    pub fn into_records(self) -> (Vec<LimitPayload>, bool) {
        match self {
            Self::Wrapped { resource } | Self::Many(resource) => (resource, true),
            Self::One(record) => (vec![record], false),
        }
    }
}

/// Partial limit update. Nullable fields accept an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/patch-limit-request.ts"
)]
pub struct PatchLimitRequest {
    #[serde(default, rename = "type")]
    pub limit_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub user_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub role_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub service_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub endpoint: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub verb: Option<Option<String>>,
    #[serde(default)]
    pub rate: Option<i64>,
    #[serde(default)]
    pub period: Option<PeriodValue>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl TryFrom<PatchLimitRequest> for LimitPatch {
    type Error = AppError;

    fn try_from(request: PatchLimitRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            limit_type: request
                .limit_type
                .as_deref()
                .map(|value| LimitType::from_str(value.trim()))
                .transpose()?,
            user_id: request.user_id.map(|value| value.map(UserId::new)),
            role_id: request.role_id.map(|value| value.map(RoleId::new)),
            service_id: request.service_id.map(|value| value.map(ServiceId::new)),
            endpoint: request.endpoint,
            verb: request.verb,
            rate: request.rate,
            period: request
                .period
                .as_ref()
                .map(PeriodValue::resolve)
                .transpose()?,
            name: request.name,
            description: request.description,
            is_active: request.is_active,
        })
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query flags shared by the limit routes.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub ids: Option<String>,
    pub rollback: Option<bool>,
    pub related: Option<String>,
}

impl LimitQuery {
    /// Returns whether counter snapshots should be embedded.
    pub fn includes_counters(&self) -> bool {
        self.related.as_deref().is_some_and(|related| {
            related
                .split(',')
                .any(|entry| entry.trim() == "limit_cache")
        })
    }
}

/// API representation of a limit rule.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/limit-response.ts"
)]
pub struct LimitResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub limit_type: String,
    pub key_text: String,
    pub rate: u32,
    pub period: String,
    pub user_id: Option<i64>,
    pub role_id: Option<i64>,
    pub service_id: Option<i64>,
    pub endpoint: Option<String>,
    pub verb: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_date: String,
    pub last_modified_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_cache: Option<Vec<CounterSnapshotResponse>>,
}

impl LimitResponse {
    #[must_use]
    pub fn with_counters(mut self, snapshots: Vec<CounterSnapshot>) -> Self {
        self.limit_cache = Some(
            snapshots
                .into_iter()
                .map(CounterSnapshotResponse::from)
                .collect(),
        );
        self
    }
}

impl From<LimitRule> for LimitResponse {
    fn from(rule: LimitRule) -> Self {
        Self {
            id: rule.id.as_i64(),
            limit_type: rule.limit_type.as_str().to_owned(),
            key_text: rule.key_text,
            rate: rule.rate,
            period: rule.period.name().to_owned(),
            user_id: rule.user_id.map(|id| id.as_i64()),
            role_id: rule.role_id.map(|id| id.as_i64()),
            service_id: rule.service_id.map(|id| id.as_i64()),
            endpoint: rule.endpoint,
            verb: rule.verb.map(|verb| verb.as_str().to_owned()),
            name: rule.name,
            description: rule.description,
            is_active: rule.is_active,
            created_date: rule.created_at.to_rfc3339(),
            last_modified_date: rule.modified_at.to_rfc3339(),
            limit_cache: None,
        }
    }
}

/// Event names an eventing layer can subscribe to.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/limit-events-response.ts"
)]
pub struct LimitEventsResponse {
    pub name: String,
    pub ids: Vec<i64>,
}
