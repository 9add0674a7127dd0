use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{any, get, post};
use limitgate_core::AppError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let system_routes = Router::new()
        .route(
            "/api/system/limits",
            get(handlers::limits::list_limits_handler)
                .post(handlers::limits::create_limits_handler)
                .patch(handlers::limits::update_limits_handler)
                .delete(handlers::limits::delete_limits_handler),
        )
        .route(
            "/api/system/limits/events",
            get(handlers::limits::limit_events_handler),
        )
        .route(
            "/api/system/limits/{id}",
            get(handlers::limits::get_limit_handler)
                .patch(handlers::limits::patch_limit_handler)
                .put(handlers::limits::replace_limit_handler)
                .delete(handlers::limits::delete_limit_handler),
        )
        .route(
            "/api/system/limit-cache",
            get(handlers::limit_cache::list_limit_cache_handler)
                .delete(handlers::limit_cache::clear_limit_cache_handler),
        )
        .route(
            "/api/system/limit-cache/{id}",
            get(handlers::limit_cache::get_limit_cache_handler)
                .delete(handlers::limit_cache::clear_limit_cache_by_id_handler),
        )
        .route(
            "/api/system/limit-subjects/deleted",
            post(handlers::subjects::subject_deleted_handler),
        )
        .route_layer(from_fn(middleware::require_admin));

    let throttled_routes = Router::new()
        .route(
            "/api/{service}",
            any(handlers::passthrough::passthrough_handler),
        )
        .route(
            "/api/{service}/{*resource}",
            any(handlers::passthrough::passthrough_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::evaluate_limits,
        ));

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(system_routes)
        .merge(throttled_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors::build_cors_layer(frontend_url)?)
        .with_state(app_state))
}
