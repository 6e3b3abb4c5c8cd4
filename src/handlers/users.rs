use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::database::models::{User, UserPatch};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

pub const DEFAULT_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PatchUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Raw query values; anything unparsable falls back to the defaults
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListQuery {
    fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset
            .as_deref()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|offset| *offset >= 0)
            .unwrap_or(0)
    }
}

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        ApiError::invalid_json("invalid request body")
    })
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request("id must be numeric"))
}

/// POST /users
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<User> {
    let request = json_body(payload)?;
    let user = state
        .users
        .create_user(request.name, request.email, request.password)
        .await?;
    Ok(ApiResponse::created(user))
}

/// GET /users?limit=&offset=
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<User>> {
    let users = state.users.list_users(query.limit(), query.offset()).await?;
    Ok(ApiResponse::success(users))
}

/// GET /users/:id (protected)
pub async fn get(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let id = parse_id(&id)?;
    tracing::debug!("User {} fetching user {}", auth_user.user_id, id);
    let user = state.users.get_user(id).await?;
    Ok(ApiResponse::success(user))
}

/// PATCH /users/:id (protected)
pub async fn patch(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<PatchUserRequest>, JsonRejection>,
) -> ApiResult<User> {
    let id = parse_id(&id)?;
    let request = json_body(payload)?;
    let patch = UserPatch {
        name: request.name,
        email: request.email,
    };

    let user = state.users.patch_user(id, patch).await?;
    tracing::info!("User {} updated user {}", auth_user.user_id, id);
    Ok(ApiResponse::success(user))
}

/// DELETE /users/:id (protected)
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let id = parse_id(&id)?;
    state.users.delete_user(id).await?;
    tracing::info!("User {} deleted user {}", auth_user.user_id, id);
    Ok(ApiResponse::<()>::no_content())
}
