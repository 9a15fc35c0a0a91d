//! API key service — self-service single-key lifecycle.

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::info;

use vigil_core::auth::{AuthError, api_keys, store};
use vigil_core::events::{EventKind, SecurityEvent};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthContext;
use crate::models::{ApiKeyResponse, ApiKeyStatusResponse};

/// Generate a fresh key for the caller, replacing any existing one. The
/// plaintext appears only in this response.
pub async fn generate(state: &AppState, ctx: &AuthContext) -> AppResult<ApiKeyResponse> {
    let ttl = Duration::days(state.config.api_key_ttl_days);
    let generated = api_keys::generate(&state.pool, ctx.id, ttl, Utc::now()).await?;

    state
        .events
        .record(
            SecurityEvent::new(EventKind::ApiKeyGenerated)
                .account(ctx.id)
                .email(&ctx.email)
                .detail(json!({"expiresAt": generated.expires_at.to_rfc3339()})),
        )
        .await;
    info!(account = %ctx.id, "api key generated");

    Ok(ApiKeyResponse {
        api_key: generated.plaintext,
        expires_at: generated.expires_at.to_rfc3339(),
    })
}

/// Revoke the caller's key, if any.
pub async fn revoke(state: &AppState, ctx: &AuthContext) -> AppResult<()> {
    api_keys::revoke(&state.pool, ctx.id).await?;
    state
        .events
        .record(
            SecurityEvent::new(EventKind::ApiKeyRevoked)
                .account(ctx.id)
                .email(&ctx.email),
        )
        .await;
    Ok(())
}

/// Key status for the caller. Neither hash nor plaintext is ever exposed.
pub async fn status(state: &AppState, ctx: &AuthContext) -> AppResult<ApiKeyStatusResponse> {
    let account = store::find_by_id(&state.pool, ctx.id)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    let now = Utc::now();

    Ok(ApiKeyStatusResponse {
        active: account.api_key_active(now),
        expires_at: account.api_key_expires_at.map(|t| t.to_rfc3339()),
        usage_count: account.api_key_usage_count,
        last_used_at: account.api_key_last_used_at.map(|t| t.to_rfc3339()),
    })
}
