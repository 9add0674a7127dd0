use std::collections::HashMap;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use limitgate_application::{LimitDecision, LimitRequest};
use limitgate_core::{AppError, CallerCredential, CallerIdentity};
use tracing::debug;

use crate::error::{ApiResult, ThrottledResponse};
use crate::state::AppState;

pub const CALLER_USER_HEADER: &str = "x-caller-user-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role-id";
pub const CALLER_ADMIN_HEADER: &str = "x-caller-admin";

/// Resolves the caller identity forwarded by the upstream gateway.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<CallerIdentity, AppError> {
    let user_id = numeric_header(headers, CALLER_USER_HEADER)?;
    let role_id = numeric_header(headers, CALLER_ROLE_HEADER)?;
    let is_admin = header_text(headers, CALLER_ADMIN_HEADER)
        .is_some_and(|value| value.eq_ignore_ascii_case("true") || value == "1");

    let credential = match header_text(headers, header::AUTHORIZATION.as_str()) {
        Some(value) if has_scheme(value, "bearer") => CallerCredential::SessionToken,
        Some(value) if has_scheme(value, "basic") => CallerCredential::BasicAuth,
        _ => CallerCredential::None,
    };

    Ok(CallerIdentity::new(user_id, role_id, is_admin, credential))
}

pub async fn require_admin(mut request: Request, next: Next) -> ApiResult<Response> {
    let caller = caller_from_headers(request.headers())?;
    if !caller.is_admin() {
        return Err(if caller.is_authenticated() {
            AppError::Forbidden("system administrator access required".to_owned()).into()
        } else {
            AppError::Unauthorized("authentication required".to_owned()).into()
        });
    }

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

pub async fn evaluate_limits(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let caller = caller_from_headers(request.headers())?;
    let limit_request = LimitRequest {
        caller,
        service: params.get("service").cloned(),
        resource: params.get("resource").cloned().unwrap_or_default(),
        method: request.method().as_str().to_owned(),
    };

    match state
        .limit_evaluation_service
        .evaluate(&limit_request)
        .await?
    {
        LimitDecision::Allowed => Ok(next.run(request).await),
        LimitDecision::Throttled {
            violations,
            headers,
        } => {
            debug!(
                service = ?limit_request.service,
                resource = %limit_request.resource,
                violations = violations.len(),
                "request throttled"
            );
            Ok(ThrottledResponse::new(violations, headers).into_response())
        }
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn numeric_header(headers: &HeaderMap, name: &str) -> Result<Option<i64>, AppError> {
    header_text(headers, name)
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| AppError::Validation(format!("{name} must be an integer")))
        })
        .transpose()
}

fn has_scheme(value: &str, scheme: &str) -> bool {
    value
        .split_once(' ')
        .is_some_and(|(prefix, credentials)| {
            prefix.eq_ignore_ascii_case(scheme) && !credentials.trim().is_empty()
        })
}
