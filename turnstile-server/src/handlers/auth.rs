use std::fmt;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use turnstile_core::Credentials;

use super::bearer_header;
use crate::infra::{app_state::AppState, errors::AppResult};

#[derive(Deserialize)]
pub struct AuthBody {
    #[serde(alias = "email")]
    pub user_name: String,
    pub password: String,
}

impl fmt::Debug for AuthBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBody")
            .field("user_name", &self.user_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_name: String,
}

pub async fn authenticate(
    State(state): State<AppState>,
    payload: Result<Json<AuthBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = payload?;

    let credentials = Credentials {
        identity: body.user_name,
        secret: body.password,
    }
    .validate()?;
    let authenticated = state.accounts().authenticate(credentials).await?;

    let authorization = bearer_header(&authenticated.token)?;
    Ok((
        [(header::AUTHORIZATION, authorization)],
        Json(AuthResponse {
            user_name: authenticated.identity,
        }),
    ))
}
