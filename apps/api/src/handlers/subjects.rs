use axum::Json;
use axum::extract::State;
use limitgate_application::SubjectRef;

use crate::dto::{SubjectDeletedRequest, SubjectDeletedResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn subject_deleted_handler(
    State(state): State<AppState>,
    Json(payload): Json<SubjectDeletedRequest>,
) -> ApiResult<Json<SubjectDeletedResponse>> {
    let removed = state
        .limit_admin_service
        .handle_subject_deleted(SubjectRef::from(payload))
        .await?
        .into_iter()
        .map(|limit_id| limit_id.as_i64())
        .collect();

    Ok(Json(SubjectDeletedResponse { removed }))
}
