use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Liveness probe; the greeting is a JSON string.
pub async fn welcome() -> Json<&'static str> {
    Json("Welcome to Users Service")
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let body = state.metrics().render().map_err(|err| {
        tracing::error!(error = %err, "failed to encode metrics");
        AppError::internal("Internal server error")
    })?;

    Ok(([(header::CONTENT_TYPE, state.metrics().content_type())], body))
}
