use limitgate_application::{BatchReport, CounterSnapshot};
use limitgate_domain::LimitId;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Query flags of the counter routes.
#[derive(Debug, Default, Deserialize)]
pub struct LimitCacheQuery {
    pub ids: Option<String>,
    #[serde(rename = "continue")]
    pub continue_on_error: Option<bool>,
    pub force: Option<bool>,
    pub allow_delete: Option<bool>,
}

impl LimitCacheQuery {
    pub fn is_forced(&self) -> bool {
        self.force.unwrap_or(false) || self.allow_delete.unwrap_or(false)
    }
}

/// Counter state of one cache key.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/counter-snapshot-response.ts"
)]
pub struct CounterSnapshotResponse {
    pub id: i64,
    pub key: String,
    pub max: u32,
    pub attempts: i64,
    pub remaining: u32,
}

impl From<CounterSnapshot> for CounterSnapshotResponse {
    fn from(snapshot: CounterSnapshot) -> Self {
        Self {
            id: snapshot.id.as_i64(),
            key: snapshot.key,
            max: snapshot.max,
            attempts: snapshot.attempts,
            remaining: snapshot.remaining,
        }
    }
}

/// Outcome for one id of a batch request.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/batch-item-response.ts"
)]
pub struct BatchItemResponse {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_cache: Option<Vec<CounterSnapshotResponse>>,
}

/// Batch outcome, in request order.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/batch-report-response.ts"
)]
pub struct BatchReportResponse {
    pub success: bool,
    pub failed_ids: Vec<i64>,
    pub items: Vec<BatchItemResponse>,
}

impl BatchReportResponse {
    fn from_report<T>(
        report: BatchReport<T>,
        counters: impl Fn(T) -> Option<Vec<CounterSnapshotResponse>>,
    ) -> Self {
        let success = report.is_success();
        let failed_ids = report
            .failed_ids()
            .into_iter()
            .map(|id| id.as_i64())
            .collect();
        let items = report
            .items
            .into_iter()
            .map(|item| match item.outcome {
                Ok(value) => BatchItemResponse {
                    id: item.id.as_i64(),
                    error: None,
                    limit_cache: counters(value),
                },
                Err(error) => BatchItemResponse {
                    id: item.id.as_i64(),
                    error: Some(error.to_string()),
                    limit_cache: None,
                },
            })
            .collect();

        Self {
            success,
            failed_ids,
            items,
        }
    }
}

impl From<BatchReport<Vec<CounterSnapshot>>> for BatchReportResponse {
    fn from(report: BatchReport<Vec<CounterSnapshot>>) -> Self {
        Self::from_report(report, |snapshots| {
            Some(
                snapshots
                    .into_iter()
                    .map(CounterSnapshotResponse::from)
                    .collect(),
            )
        })
    }
}

impl From<BatchReport<LimitId>> for BatchReportResponse {
    fn from(report: BatchReport<LimitId>) -> Self {
        Self::from_report(report, |_| None)
    }
}
