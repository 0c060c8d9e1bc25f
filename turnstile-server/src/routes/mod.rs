use std::any::Any;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower::Layer;
use tower_http::{
    catch_panic::CatchPanicLayer, normalize_path::NormalizePathLayer,
    trace::TraceLayer,
};

use crate::handlers;
use crate::infra::{app_state::AppState, correlation, logging, metrics};

pub const ROOT: &str = "/";
pub const METRICS: &str = "/metrics";
pub const USERS: &str = "/users";
pub const REGISTER: &str = "/register";
pub const AUTH: &str = "/auth";

/// Routes with their handlers, before any cross-cutting layers.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route(ROOT, get(handlers::welcome))
        .route(METRICS, get(handlers::metrics))
        .route(USERS, post(handlers::register))
        .route(REGISTER, post(handlers::register))
        .route(AUTH, post(handlers::authenticate))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            metrics::track_http_metrics,
        ))
        .with_state(state)
}

/// The complete application: trailing slashes are trimmed before routing,
/// then (outer to inner) correlation ids, request tracing and panic
/// recovery wrap the routes.
pub fn create_app(state: AppState) -> Router {
    let api = NormalizePathLayer::trim_trailing_slash().layer(create_api_router(state));

    Router::new()
        .fallback_service(api)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http().make_span_with(logging::request_span))
        .layer(middleware::from_fn(correlation::propagate_request_id))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "message": "Internal server error",
            "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        })),
    )
        .into_response()
}
