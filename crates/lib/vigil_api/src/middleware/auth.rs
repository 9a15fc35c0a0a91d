//! Authentication middleware — bearer token / API key extraction and
//! capability checks.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use vigil_core::auth::api_keys;
use vigil_core::events::{EventKind, SecurityEvent};
use vigil_core::rbac::{self, Capability, Role};

use crate::AppState;
use crate::error::AppError;
use crate::middleware::client::client_ip;

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Identity context attached to every authenticated request, consumed by
/// the capability guards and handlers downstream.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Extracts `Authorization: Bearer <token>` or `X-API-Key: <key>`,
/// verifies it, and injects an [`AuthContext`] request extension.
///
/// A bearer token wins when both are present. API key verification
/// increments the key's usage counter as a side effect.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = if let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;
        let claims = state.issuer.verify_access(token)?;
        AuthContext {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    } else if let Some(key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        let account = api_keys::verify(&state.pool, key, Utc::now()).await?;
        AuthContext {
            id: account.id,
            email: account.email,
            role: account.role,
        }
    } else {
        return Err(AppError::Unauthorized("Missing credentials".into()));
    };

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Capability guard: every listed capability must be granted to the
/// caller's role. Runs after [`require_auth`].
///
/// A denial is recorded as a security event (identity, required
/// capabilities, path) off the request path, then answered with 403; the
/// resource context stays server-side.
pub async fn require_capabilities(
    State(state): State<AppState>,
    request: Request,
    next: Next,
    required: &'static [Capability],
) -> Result<Response, AppError> {
    let ctx = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Missing credentials".into()))?;

    let granted = rbac::permissions_for(ctx.role);
    if !rbac::require_all(required, granted) {
        let event = SecurityEvent::new(EventKind::PermissionDenied)
            .account(ctx.id)
            .email(&ctx.email)
            .detail(json!({
                "required": required.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                "path": request.uri().path(),
                "role": ctx.role.as_str(),
            }))
            .client(
                client_ip(request.headers(), request.extensions()).as_deref(),
                None,
            );
        let events = state.events.clone();
        tokio::spawn(async move { events.record(event).await });
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

/// Guard for admin account management routes.
pub async fn require_users_manage(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_capabilities(state, request, next, &[Capability::UsersManage]).await
}

/// Guard for the security event log.
pub async fn require_events_view(
    state: State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_capabilities(state, request, next, &[Capability::EventsView]).await
}
