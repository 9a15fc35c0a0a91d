//! API key request handlers.

use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthContext;
use crate::models::{ApiKeyResponse, ApiKeyStatusResponse, SuccessResponse};
use crate::services::api_keys;

/// `POST /auth/api-key` — generate a new key, invalidating any prior one.
pub async fn generate_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<ApiKeyResponse>> {
    let resp = api_keys::generate(&state, &ctx).await?;
    Ok(Json(resp))
}

/// `GET /auth/api-key` — current key status (no secrets).
pub async fn status_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<ApiKeyStatusResponse>> {
    let resp = api_keys::status(&state, &ctx).await?;
    Ok(Json(resp))
}

/// `DELETE /auth/api-key` — revoke the caller's key.
pub async fn revoke_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<SuccessResponse>> {
    api_keys::revoke(&state, &ctx).await?;
    Ok(Json(SuccessResponse { success: true }))
}
