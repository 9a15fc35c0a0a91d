//! Authentication request handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthContext;
use crate::middleware::client::ClientMeta;
use crate::models::{
    AccountResponse, ChangePasswordRequest, IdentityResponse, LoginRequest, RefreshRequest,
    RegisterRequest, SuccessResponse, TokenResponse,
};
use crate::services::{auth, cookies};

/// `POST /auth/login` — authenticate with email + password. Sets the
/// refresh token cookie alongside the JSON pair.
pub async fn login_handler(
    State(state): State<AppState>,
    client: ClientMeta,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let resp = auth::login(&state, &body.email, &body.password, &client).await?;
    let jar = jar.add(cookies::refresh_cookie(
        &resp.refresh_token,
        state.config.refresh_ttl_secs,
    ));
    Ok((jar, Json(resp)))
}

/// `POST /auth/register` — create a new account.
pub async fn register_handler(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    let resp = auth::register(&state, &body.email, &body.password, &client).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// `POST /auth/refresh` — exchange the refresh token (cookie, or JSON
/// body as fallback) for a rotated pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    client: ClientMeta,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let token = jar
        .get(cookies::REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.as_ref().and_then(|b| b.refresh_token.clone()))
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".into()))?;

    let resp = auth::refresh(&state, &token, &client).await?;
    let jar = jar.add(cookies::refresh_cookie(
        &resp.refresh_token,
        state.config.refresh_ttl_secs,
    ));
    Ok((jar, Json(resp)))
}

/// `POST /auth/logout` — clear the refresh cookie. Stateless: tokens
/// already issued die at their natural expiry.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    client: ClientMeta,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<SuccessResponse>)> {
    auth::logout(&state, &ctx, &client).await?;
    Ok((
        jar.add(cookies::clear_refresh_cookie()),
        Json(SuccessResponse { success: true }),
    ))
}

/// `GET /auth/me` — the authenticated identity context.
pub async fn me_handler(
    Extension(ctx): Extension<AuthContext>,
) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        id: ctx.id,
        email: ctx.email,
        role: ctx.role,
    })
}

/// `PUT /auth/password` — change the caller's password.
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    client: ClientMeta,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<SuccessResponse>> {
    auth::change_password(
        &state,
        &ctx,
        &body.current_password,
        &body.new_password,
        &client,
    )
    .await?;
    Ok(Json(SuccessResponse { success: true }))
}
