use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use limitgate_application::BatchMode;
use limitgate_domain::LimitId;

use crate::dto::{BatchReportResponse, CounterSnapshotResponse, LimitCacheQuery, parse_limit_ids};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_limit_cache_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitCacheQuery>,
) -> ApiResult<Response> {
    if let Some(ids) = query.ids.as_deref() {
        let limit_ids = parse_limit_ids(ids)?;
        let report = state
            .limit_admin_service
            .counters_for_limits(&limit_ids, batch_mode(&query))
            .await;
        return Ok(batch_response(BatchReportResponse::from(report)));
    }

    let snapshots = state
        .limit_admin_service
        .all_counters()
        .await?
        .into_iter()
        .map(CounterSnapshotResponse::from)
        .collect::<Vec<_>>();

    Ok(Json(snapshots).into_response())
}

pub async fn clear_limit_cache_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitCacheQuery>,
) -> ApiResult<Response> {
    if let Some(ids) = query.ids.as_deref() {
        let limit_ids = parse_limit_ids(ids)?;
        let report = state
            .limit_admin_service
            .clear_counters_for_limits(&limit_ids, batch_mode(&query))
            .await;
        return Ok(batch_response(BatchReportResponse::from(report)));
    }

    state
        .limit_admin_service
        .clear_all_counters(query.is_forced())
        .await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn get_limit_cache_handler(
    State(state): State<AppState>,
    Path(limit_id): Path<i64>,
) -> ApiResult<Json<Vec<CounterSnapshotResponse>>> {
    let snapshots = state
        .limit_admin_service
        .limit_counters(LimitId::new(limit_id))
        .await?
        .into_iter()
        .map(CounterSnapshotResponse::from)
        .collect();

    Ok(Json(snapshots))
}

pub async fn clear_limit_cache_by_id_handler(
    State(state): State<AppState>,
    Path(limit_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .limit_admin_service
        .clear_counters(LimitId::new(limit_id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn batch_mode(query: &LimitCacheQuery) -> BatchMode {
    BatchMode::from_continue_flag(query.continue_on_error.unwrap_or(false))
}

fn batch_response(report: BatchReportResponse) -> Response {
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(report)).into_response()
}
