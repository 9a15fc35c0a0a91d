//! Admin request handlers — account management and the security event
//! log. All routes are capability-gated in the router.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde_json::json;
use uuid::Uuid;

use vigil_core::auth::{lockout, store};
use vigil_core::events::{self, EventKind, SecurityEvent};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthContext;
use crate::models::{
    EventListResponse, EventResponse, EventsQuery, SetActiveRequest, SuccessResponse,
};

const DEFAULT_EVENT_LIMIT: i64 = 100;
const MAX_EVENT_LIMIT: i64 = 500;

/// `GET /admin/events` — recent security events, newest first.
pub async fn list_events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> AppResult<Json<EventListResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .clamp(1, MAX_EVENT_LIMIT);
    let events = events::recent(&state.pool, limit).await?;

    Ok(Json(EventListResponse {
        events: events
            .into_iter()
            .map(|e| EventResponse {
                id: e.id,
                account_id: e.account_id,
                email: e.email,
                kind: e.kind,
                detail: e.detail,
                ip: e.ip,
                user_agent: e.user_agent,
                created_at: e.created_at.to_rfc3339(),
            })
            .collect(),
    }))
}

/// `POST /admin/accounts/{id}/unlock` — clear a lockout early.
pub async fn unlock_account_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    let account = store::find_by_id(&state.pool, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("account not found".into()))?;

    lockout::reset(&state.pool, account.id).await?;
    state
        .events
        .record(
            SecurityEvent::new(EventKind::AccountUnlocked)
                .account(account.id)
                .email(&account.email)
                .detail(json!({"by": ctx.id})),
        )
        .await;
    Ok(Json(SuccessResponse { success: true }))
}

/// `POST /admin/accounts/{id}/verify` — mark an account verified.
/// Verification is an admin action here; mail delivery is not this
/// service's concern.
pub async fn verify_account_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    if !store::mark_verified(&state.pool, account_id).await? {
        return Err(AppError::NotFound("account not found".into()));
    }
    state
        .events
        .record(
            SecurityEvent::new(EventKind::AccountVerified)
                .account(account_id)
                .detail(json!({"by": ctx.id})),
        )
        .await;
    Ok(Json(SuccessResponse { success: true }))
}

/// `PUT /admin/accounts/{id}/active` — soft-activate or deactivate.
pub async fn set_active_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(account_id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> AppResult<Json<SuccessResponse>> {
    if !store::set_active(&state.pool, account_id, body.active).await? {
        return Err(AppError::NotFound("account not found".into()));
    }
    let kind = if body.active {
        EventKind::AccountReactivated
    } else {
        EventKind::AccountDeactivated
    };
    state
        .events
        .record(
            SecurityEvent::new(kind)
                .account(account_id)
                .detail(json!({"by": ctx.id})),
        )
        .await;
    Ok(Json(SuccessResponse { success: true }))
}
