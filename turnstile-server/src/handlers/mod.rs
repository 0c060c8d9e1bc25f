//! HTTP request handlers organized by functionality

pub mod auth;
pub mod health;
pub mod users;

use axum::http::HeaderValue;
use turnstile_core::SignedToken;

use crate::infra::errors::AppError;

/// `Authorization` header value carrying a freshly issued token.
pub(crate) fn bearer_header(token: &SignedToken) -> Result<HeaderValue, AppError> {
    let mut value = HeaderValue::from_str(&token.bearer())
        .map_err(|_| AppError::internal("Internal server error"))?;
    value.set_sensitive(true);
    Ok(value)
}

pub use auth::authenticate;
pub use health::{metrics, welcome};
pub use users::register;
