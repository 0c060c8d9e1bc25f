use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use turnstile_core::{AuthenticationError, RegistrationError, ValidationError};

pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "Internal server error";
const UNPARSEABLE_MESSAGE: &str = "Unable to parse the request payload.";

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "message": self.message,
            "status": self.status.as_u16(),
        }));

        (self.status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected request payload");
        Self::unprocessable(UNPARSEABLE_MESSAGE)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Conflict(field) => {
                Self::conflict(field.conflict_message())
            }
            RegistrationError::Internal(failure) => {
                tracing::error!(error = %failure, "registration failed");
                Self::internal(INTERNAL_MESSAGE)
            }
        }
    }
}

impl From<AuthenticationError> for AppError {
    fn from(err: AuthenticationError) -> Self {
        match err {
            AuthenticationError::InvalidCredentials => {
                Self::unauthorized(err.to_string())
            }
            AuthenticationError::Internal(failure) => {
                tracing::error!(error = %failure, "authentication failed");
                Self::internal(INTERNAL_MESSAGE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use turnstile_core::{AccountField, InternalFailure, RepositoryError};

    use super::*;

    #[test]
    fn maps_workflow_errors_to_statuses() {
        let err = AppError::from(RegistrationError::Conflict(AccountField::Identity));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "User with this email already exists");

        let err = AppError::from(AuthenticationError::InvalidCredentials);
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "Invalid credentials");

        let err = AppError::from(ValidationError::SecretLength);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_details_stay_out_of_responses() {
        let failure = InternalFailure::Repository(RepositoryError::Unavailable(
            "postgres://svc:pw@db refused".into(),
        ));
        let err = AppError::from(RegistrationError::Internal(failure));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }
}
