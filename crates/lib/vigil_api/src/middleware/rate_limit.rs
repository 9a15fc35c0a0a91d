//! Rate limiting middleware.
//!
//! Runs before business logic on every route group. Identity is the
//! authenticated account id when the auth layer already ran, else the
//! client IP. Denials surface as 429 with the standard retry headers.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use vigil_core::ratelimit::{Category, Decision};

use crate::AppState;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::middleware::client::client_ip;

/// Count a request against `category`, denying once the budget is spent.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
    category: Category,
) -> Result<Response, AppError> {
    let identity = request
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.id.to_string())
        .or_else(|| client_ip(request.headers(), request.extensions()))
        .unwrap_or_else(|| "unknown".to_string());

    match state.limiter.consume(category, &identity, Utc::now()).await {
        Decision::Allowed { .. } => Ok(next.run(request).await),
        Decision::Denied { retry_after, reset } => Err(AppError::RateLimited {
            retry_after,
            limit: state.limiter.limit(category),
            reset: reset.timestamp(),
        }),
    }
}

/// Auth category: public credential endpoints, keyed by client IP.
pub async fn limit_auth(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit(state, request, next, Category::Auth).await
}

/// General API category.
pub async fn limit_api(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit(state, request, next, Category::Api).await
}

/// AI category — mounted by the (external) AI proxy router.
pub async fn limit_ai(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit(state, request, next, Category::Ai).await
}

/// Admin category.
pub async fn limit_admin(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit(state, request, next, Category::Admin).await
}
