use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UserServiceError;

use super::users::json_body;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
}

/// POST /login - Authenticate with email and password and receive a JWT
///
/// Unknown email and wrong password produce the same 401 so the response
/// does not reveal which accounts exist.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let request = json_body(payload)?;

    let user = match state.users.authenticate(&request.email, request.password).await {
        Ok(user) => user,
        Err(UserServiceError::NotFound) | Err(UserServiceError::InvalidPassword) => {
            tracing::warn!("Failed login attempt for {}", request.email);
            return Err(ApiError::unauthorized("authentication failed"));
        }
        Err(e) => return Err(e.into()),
    };

    let token = state.tokens.issue(user.id)?;
    tracing::info!("User {} logged in", user.id);

    Ok(ApiResponse::success(LoginResponse {
        token,
        expires_in: state.tokens.expires_in(),
    }))
}
