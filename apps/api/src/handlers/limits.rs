use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use limitgate_application::{CreateLimitsOptions, LimitExceededEvent, LimitPatch};
use limitgate_core::AppError;
use limitgate_domain::{LimitId, LimitInput, LimitRule};

use crate::dto::{
    CreateLimitsRequest, LimitEventsResponse, LimitPayload, LimitQuery, LimitResponse,
    PatchLimitRequest, parse_limit_ids,
};
use crate::error::ApiResult;
use crate::state::AppState;

#[cfg(test)]
mod tests;

pub async fn list_limits_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<LimitResponse>>> {
    let rules = match query.ids.as_deref() {
        Some(ids) => {
            let mut rules = Vec::new();
            for limit_id in parse_limit_ids(ids)? {
                rules.push(state.limit_admin_service.get_limit(limit_id).await?);
            }
            rules
        }
        None => state.limit_admin_service.list_limits().await?,
    };

    Ok(Json(render_all(&state, rules, &query).await?))
}

pub async fn create_limits_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
    Json(payload): Json<CreateLimitsRequest>,
) -> ApiResult<Response> {
    let (records, is_batch) = payload.into_records();
    let mut inputs = records
        .into_iter()
        .map(LimitInput::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    if !is_batch && let Some(input) = inputs.pop() {
        let created = state.limit_admin_service.create_limit(input).await?;
        let rendered = render(&state, created, &query).await?;
        return Ok((StatusCode::CREATED, Json(rendered)).into_response());
    }

    let created = state
        .limit_admin_service
        .create_limits(
            inputs,
            CreateLimitsOptions {
                rollback: query.rollback.unwrap_or(false),
            },
        )
        .await?;
    let rendered = render_all(&state, created, &query).await?;

    Ok((StatusCode::CREATED, Json(rendered)).into_response())
}

pub async fn update_limits_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
    Json(payload): Json<PatchLimitRequest>,
) -> ApiResult<Json<Vec<LimitResponse>>> {
    let limit_ids = required_ids(&query)?;
    let updated = state
        .limit_admin_service
        .update_limits(&limit_ids, LimitPatch::try_from(payload)?)
        .await?;

    Ok(Json(render_all(&state, updated, &query).await?))
}

pub async fn delete_limits_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<LimitResponse>>> {
    let limit_ids = required_ids(&query)?;
    let deleted = state.limit_admin_service.delete_limits(&limit_ids).await?;

    Ok(Json(deleted.into_iter().map(LimitResponse::from).collect()))
}

pub async fn get_limit_handler(
    State(state): State<AppState>,
    Path(limit_id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<LimitResponse>> {
    let rule = state
        .limit_admin_service
        .get_limit(LimitId::new(limit_id))
        .await?;

    Ok(Json(render(&state, rule, &query).await?))
}

pub async fn patch_limit_handler(
    State(state): State<AppState>,
    Path(limit_id): Path<i64>,
    Query(query): Query<LimitQuery>,
    Json(payload): Json<PatchLimitRequest>,
) -> ApiResult<Json<LimitResponse>> {
    let rule = state
        .limit_admin_service
        .update_limit(LimitId::new(limit_id), LimitPatch::try_from(payload)?)
        .await?;

    Ok(Json(render(&state, rule, &query).await?))
}

pub async fn replace_limit_handler(
    State(state): State<AppState>,
    Path(limit_id): Path<i64>,
    Query(query): Query<LimitQuery>,
    Json(payload): Json<LimitPayload>,
) -> ApiResult<Json<LimitResponse>> {
    let input = LimitInput::try_from(payload)?;
    let rule = state
        .limit_admin_service
        .update_limit(LimitId::new(limit_id), LimitPatch::from(input))
        .await?;

    Ok(Json(render(&state, rule, &query).await?))
}

pub async fn delete_limit_handler(
    State(state): State<AppState>,
    Path(limit_id): Path<i64>,
) -> ApiResult<Json<LimitResponse>> {
    let rule = state
        .limit_admin_service
        .delete_limit(LimitId::new(limit_id))
        .await?;

    Ok(Json(LimitResponse::from(rule)))
}

pub async fn limit_events_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<LimitEventsResponse>> {
    let ids = state
        .limit_admin_service
        .active_limit_ids()
        .await?
        .into_iter()
        .map(|limit_id| limit_id.as_i64())
        .collect();

    Ok(Json(LimitEventsResponse {
        name: LimitExceededEvent::GENERIC_NAME.to_owned(),
        ids,
    }))
}

fn required_ids(query: &LimitQuery) -> Result<Vec<LimitId>, AppError> {
    let limit_ids = query
        .ids
        .as_deref()
        .map(parse_limit_ids)
        .transpose()?
        .unwrap_or_default();

    if limit_ids.is_empty() {
        return Err(AppError::Validation(
            "the 'ids' query parameter is required".to_owned(),
        ));
    }
    Ok(limit_ids)
}

async fn render(state: &AppState, rule: LimitRule, query: &LimitQuery) -> ApiResult<LimitResponse> {
    if !query.includes_counters() {
        return Ok(LimitResponse::from(rule));
    }

    let snapshots = state.limit_admin_service.limit_counters(rule.id).await?;
    Ok(LimitResponse::from(rule).with_counters(snapshots))
}

async fn render_all(
    state: &AppState,
    rules: Vec<LimitRule>,
    query: &LimitQuery,
) -> ApiResult<Vec<LimitResponse>> {
    let mut rendered = Vec::with_capacity(rules.len());
    for rule in rules {
        rendered.push(render(state, rule, query).await?);
    }
    Ok(rendered)
}
