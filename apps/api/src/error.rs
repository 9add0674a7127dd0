use axum::Json;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use limitgate_application::{RateLimitHeaders, Violation};
use limitgate_core::AppError;
use serde::Serialize;
use ts_rs::TS;

/// API error payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/error-response.ts"
)]
pub struct ErrorResponse {
    message: String,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = Json(ErrorResponse {
            message: self.0.to_string(),
        });

        (status, payload).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Violated rule as reported to the caller.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/limit-violation-response.ts"
)]
pub struct LimitViolationResponse {
    pub id: i64,
    pub name: String,
}

/// Payload of a throttled request.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/throttled-response.ts"
)]
pub struct ThrottledPayload {
    pub message: String,
    pub violations: Vec<LimitViolationResponse>,
}

/// 429 response carrying the rate-limit headers of the most restrictive
/// violated rule.
#[derive(Debug)]
pub struct ThrottledResponse {
    violations: Vec<Violation>,
    headers: RateLimitHeaders,
}

impl ThrottledResponse {
    pub fn new(violations: Vec<Violation>, headers: RateLimitHeaders) -> Self {
        Self {
            violations,
            headers,
        }
    }

    fn header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert_numeric(&mut headers, "x-ratelimit-limit", self.headers.limit);
        insert_numeric(&mut headers, "x-ratelimit-remaining", self.headers.remaining);
        if let Some(retry_after) = self.headers.retry_after {
            insert_numeric(&mut headers, "retry-after", retry_after);
        }
        if let Some(reset_at) = self.headers.reset_at {
            insert_numeric(&mut headers, "x-ratelimit-reset", reset_at);
        }
        headers
    }
}

impl IntoResponse for ThrottledResponse {
    fn into_response(self) -> Response {
        let headers = self.header_map();
        let payload = Json(ThrottledPayload {
            message: "API limit(s) exceeded.".to_owned(),
            violations: self
                .violations
                .into_iter()
                .map(|violation| LimitViolationResponse {
                    id: violation.id.as_i64(),
                    name: violation.name,
                })
                .collect(),
        });

        (StatusCode::TOO_MANY_REQUESTS, headers, payload).into_response()
    }
}

fn insert_numeric(headers: &mut HeaderMap, name: &'static str, value: impl Into<HeaderValue>) {
    headers.insert(HeaderName::from_static(name), value.into());
}
