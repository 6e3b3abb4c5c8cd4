use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::auth::TokenService;
use crate::error::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

/// Authenticated user context extracted from JWT
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
}

impl AuthUser {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }
}

/// JWT authentication middleware that validates tokens and extracts user context
pub async fn jwt_auth_middleware(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(request.headers())?;

    let user_id = tokens.verify(token).map_err(|err| {
        tracing::warn!("Rejected token on {}: {}", request.uri().path(), err);
        ApiError::from(err)
    })?;

    let auth_user = AuthUser::new(user_id);
    tracing::debug!("Authenticated user {} for {}", auth_user.user_id, request.uri().path());
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Extract the token from the Authorization header.
///
/// The `Bearer ` prefix is stripped when present; a bare token is passed
/// through unchanged.
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("Authorization header is required"))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?;

    if auth_str.is_empty() {
        return Err(ApiError::unauthorized("Authorization header is required"));
    }

    Ok(auth_str.strip_prefix(BEARER_PREFIX).unwrap_or(auth_str))
}
