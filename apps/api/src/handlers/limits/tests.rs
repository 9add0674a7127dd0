use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use limitgate_application::{CacheFailurePolicy, LimitExceededEvent};
use limitgate_core::AppError;
use limitgate_domain::UserId;
use limitgate_infrastructure::{
    InMemoryLimitCacheStore, InMemoryLimitDirectory, InMemoryLimitRepository,
    TracingLimitEventPublisher,
};
use serde_json::json;

use crate::dto::{CreateLimitsRequest, LimitCacheQuery, LimitQuery, SubjectDeletedRequest};
use crate::error::ApiError;
use crate::handlers::{limit_cache, subjects};
use crate::state::AppState;

use super::{
    create_limits_handler, delete_limit_handler, get_limit_handler, limit_events_handler,
    list_limits_handler, update_limits_handler,
};

fn build_state(directory: Arc<InMemoryLimitDirectory>) -> AppState {
    AppState::new(
        Arc::new(InMemoryLimitRepository::new()),
        directory,
        Arc::new(InMemoryLimitCacheStore::new()),
        Arc::new(TracingLimitEventPublisher::new()),
        CacheFailurePolicy::FailOpen,
    )
}

fn create_request(value: serde_json::Value) -> CreateLimitsRequest {
    match serde_json::from_value(value) {
        Ok(request) => request,
        Err(error) => panic!("invalid create request: {error}"),
    }
}

#[tokio::test]
async fn single_record_is_created_and_listed_with_period_name() {
    let state = build_state(Arc::new(InMemoryLimitDirectory::new()));

    let response = create_limits_handler(
        State(state.clone()),
        Query(LimitQuery::default()),
        Json(create_request(json!({
            "type": "instance",
            "rate": 100,
            "period": 1,
            "name": "instance hourly"
        }))),
    )
    .await;
    assert!(matches!(&response, Ok(response) if response.status() == StatusCode::CREATED));

    let listed = list_limits_handler(State(state), Query(LimitQuery::default())).await;
    let Ok(Json(listed)) = listed else {
        panic!("listing should succeed");
    };
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].period, "hour");
    assert_eq!(listed[0].key_text, "instance.hour");
    assert!(listed[0].is_active);
    assert!(listed[0].limit_cache.is_none());
}

#[tokio::test]
async fn duplicate_batch_is_rejected_as_conflict() {
    let state = build_state(Arc::new(InMemoryLimitDirectory::new()));
    let record = json!({ "type": "instance", "rate": 5, "period": "minute", "name": "burst" });

    let result = create_limits_handler(
        State(state.clone()),
        Query(LimitQuery::default()),
        Json(create_request(json!({ "resource": [record.clone(), record] }))),
    )
    .await;

    assert!(matches!(result, Err(ApiError(AppError::Conflict(_)))));
    let listed = list_limits_handler(State(state), Query(LimitQuery::default())).await;
    assert!(matches!(listed, Ok(Json(listed)) if listed.is_empty()));
}

#[tokio::test]
async fn bulk_update_requires_ids() {
    let state = build_state(Arc::new(InMemoryLimitDirectory::new()));
    let result = update_limits_handler(
        State(state),
        Query(LimitQuery::default()),
        Json(crate::dto::PatchLimitRequest::default()),
    )
    .await;

    assert!(matches!(result, Err(ApiError(AppError::Validation(_)))));
}

#[tokio::test]
async fn related_limit_cache_embeds_counter_snapshots() {
    let state = build_state(Arc::new(InMemoryLimitDirectory::new()));
    let created = create_limits_handler(
        State(state.clone()),
        Query(LimitQuery::default()),
        Json(create_request(json!({
            "type": "instance",
            "rate": 3,
            "period": 0,
            "name": "per minute"
        }))),
    )
    .await;
    assert!(created.is_ok());

    let query = LimitQuery {
        related: Some("limit_cache".to_owned()),
        ..LimitQuery::default()
    };
    let fetched = get_limit_handler(State(state), Path(1), Query(query)).await;
    let Ok(Json(fetched)) = fetched else {
        panic!("limit 1 should exist");
    };

    let snapshots = fetched.limit_cache.unwrap_or_default();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].key, "instance.minute");
    assert_eq!(snapshots[0].attempts, 0);
    assert_eq!(snapshots[0].remaining, 3);
}

#[tokio::test]
async fn events_list_active_limit_ids_under_generic_name() {
    let state = build_state(Arc::new(InMemoryLimitDirectory::new()));
    let created = create_limits_handler(
        State(state.clone()),
        Query(LimitQuery::default()),
        Json(create_request(json!([
            { "type": "instance", "rate": 3, "period": 0, "name": "active" },
            { "type": "instance", "rate": 3, "period": 1, "name": "paused", "is_active": false }
        ]))),
    )
    .await;
    assert!(created.is_ok());

    let events = limit_events_handler(State(state)).await;
    let Ok(Json(events)) = events else {
        panic!("events should list");
    };
    assert_eq!(events.name, LimitExceededEvent::GENERIC_NAME);
    assert_eq!(events.ids, vec![1]);
}

#[tokio::test]
async fn deleting_unknown_limit_is_not_found() {
    let state = build_state(Arc::new(InMemoryLimitDirectory::new()));
    let result = delete_limit_handler(State(state), Path(42)).await;

    assert!(matches!(result, Err(ApiError(AppError::NotFound(_)))));
}

#[tokio::test]
async fn clearing_all_counters_requires_force() {
    let state = build_state(Arc::new(InMemoryLimitDirectory::new()));

    let refused = limit_cache::clear_limit_cache_handler(
        State(state.clone()),
        Query(LimitCacheQuery::default()),
    )
    .await;
    assert!(matches!(refused, Err(ApiError(AppError::Validation(_)))));

    let forced = limit_cache::clear_limit_cache_handler(
        State(state),
        Query(LimitCacheQuery {
            force: Some(true),
            ..LimitCacheQuery::default()
        }),
    )
    .await;
    assert!(matches!(forced, Ok(response) if response.status() == StatusCode::NO_CONTENT));
}

#[tokio::test]
async fn batch_counter_lookup_reports_unknown_ids_as_bad_request() {
    let state = build_state(Arc::new(InMemoryLimitDirectory::new()));
    let created = create_limits_handler(
        State(state.clone()),
        Query(LimitQuery::default()),
        Json(create_request(json!({
            "type": "instance",
            "rate": 3,
            "period": 0,
            "name": "per minute"
        }))),
    )
    .await;
    assert!(created.is_ok());

    let response = limit_cache::list_limit_cache_handler(
        State(state),
        Query(LimitCacheQuery {
            ids: Some("1,9".to_owned()),
            continue_on_error: Some(true),
            ..LimitCacheQuery::default()
        }),
    )
    .await;

    assert!(matches!(response, Ok(response) if response.status() == StatusCode::BAD_REQUEST));
}

#[tokio::test]
async fn deleted_user_cascades_to_scoped_limits() {
    let directory = Arc::new(InMemoryLimitDirectory::new());
    directory.add_user(UserId::new(7), false).await;
    let state = build_state(directory);

    let created = create_limits_handler(
        State(state.clone()),
        Query(LimitQuery::default()),
        Json(create_request(json!({
            "type": "instance.user",
            "user_id": 7,
            "rate": 10,
            "period": "day",
            "name": "user seven daily"
        }))),
    )
    .await;
    assert!(created.is_ok());

    let request: SubjectDeletedRequest =
        match serde_json::from_value(json!({ "kind": "user", "id": 7 })) {
            Ok(request) => request,
            Err(error) => panic!("invalid subject request: {error}"),
        };
    let removed = subjects::subject_deleted_handler(State(state.clone()), Json(request)).await;
    assert!(matches!(removed, Ok(Json(response)) if response.removed == vec![1]));

    let listed = list_limits_handler(State(state), Query(LimitQuery::default())).await;
    assert!(matches!(listed, Ok(Json(listed)) if listed.is_empty()));
}
