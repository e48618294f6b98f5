// handlers/auth.rs - POST /auth/login

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::auth::{authenticate, LoginResult};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Exchange email and password for a bearer token
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResult> {
    let Json(request) = body?;
    let result = authenticate(
        state.store.as_ref(),
        &state.registry,
        &state.tokens,
        &request.email,
        &request.password,
    )
    .await?;
    Ok(ApiResponse::success(result))
}
