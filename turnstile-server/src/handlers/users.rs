use std::fmt;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use turnstile_core::{AccountId, RegistrationRequest};

use super::bearer_header;
use crate::infra::{app_state::AppState, errors::AppResult};

/// Registration payload. The identity is accepted as `user_name` or
/// `email`.
#[derive(Deserialize)]
pub struct RegisterBody {
    #[serde(alias = "email")]
    pub user_name: String,
    pub password: String,
    pub organization_name: Option<String>,
    pub username: Option<String>,
    pub location: Option<String>,
}

impl fmt::Debug for RegisterBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterBody")
            .field("user_name", &self.user_name)
            .field("organization_name", &self.organization_name)
            .finish_non_exhaustive()
    }
}

impl From<RegisterBody> for RegistrationRequest {
    fn from(body: RegisterBody) -> Self {
        RegistrationRequest {
            identity: body.user_name,
            secret: body.password,
            username: body.username,
            organization_name: body.organization_name,
            location: body.location,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user_id: AccountId,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = payload?;

    let registration = RegistrationRequest::from(body).validate(&state.validation)?;
    let registered = state.accounts().register(registration).await?;

    let authorization = bearer_header(&registered.token)?;
    Ok((
        StatusCode::CREATED,
        [(header::AUTHORIZATION, authorization)],
        Json(RegisterResponse {
            message: "User created successfully",
            user_id: registered.account_id,
        }),
    ))
}
