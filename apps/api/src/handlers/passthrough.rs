use std::collections::HashMap;

use axum::Json;
use axum::extract::Path;
use axum::http::Method;

use crate::dto::PassthroughResponse;

pub async fn passthrough_handler(
    method: Method,
    Path(params): Path<HashMap<String, String>>,
) -> Json<PassthroughResponse> {
    Json(PassthroughResponse {
        service: params.get("service").cloned().unwrap_or_default(),
        resource: params.get("resource").cloned().unwrap_or_default(),
        method: method.as_str().to_owned(),
    })
}
