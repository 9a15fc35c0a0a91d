//! Security event recording.
//!
//! Append-only audit trail of auth-relevant events, consumed by the logs
//! UI. The sink is injected at construction so components never touch
//! process-global state; recording never fails the request that triggered
//! it — sinks log their own errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::uuid::uuidv7;

/// Kinds of auth-relevant events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AccountRegistered,
    AccountVerified,
    AccountDeactivated,
    AccountReactivated,
    AccountLocked,
    AccountUnlocked,
    LoginSuccess,
    LoginFailure,
    Logout,
    TokenRefreshed,
    PasswordChanged,
    ApiKeyGenerated,
    ApiKeyRevoked,
    PermissionDenied,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AccountRegistered => "account_registered",
            EventKind::AccountVerified => "account_verified",
            EventKind::AccountDeactivated => "account_deactivated",
            EventKind::AccountReactivated => "account_reactivated",
            EventKind::AccountLocked => "account_locked",
            EventKind::AccountUnlocked => "account_unlocked",
            EventKind::LoginSuccess => "login_success",
            EventKind::LoginFailure => "login_failure",
            EventKind::Logout => "logout",
            EventKind::TokenRefreshed => "token_refreshed",
            EventKind::PasswordChanged => "password_changed",
            EventKind::ApiKeyGenerated => "api_key_generated",
            EventKind::ApiKeyRevoked => "api_key_revoked",
            EventKind::PermissionDenied => "permission_denied",
        }
    }
}

/// A single auth-relevant occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub account_id: Option<Uuid>,
    pub email: Option<String>,
    pub kind: EventKind,
    pub detail: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl SecurityEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            account_id: None,
            email: None,
            kind,
            detail: serde_json::Value::Null,
            ip: None,
            user_agent: None,
        }
    }

    pub fn account(mut self, id: Uuid) -> Self {
        self.account_id = Some(id);
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn client(mut self, ip: Option<&str>, user_agent: Option<&str>) -> Self {
        self.ip = ip.map(str::to_string);
        self.user_agent = user_agent.map(str::to_string);
        self
    }
}

/// Destination for security events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record an event. Must not fail the caller.
    async fn record(&self, event: SecurityEvent);
}

/// Sink that appends to the `security_events` table.
pub struct PgEventSink {
    pool: PgPool,
}

impl PgEventSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSink for PgEventSink {
    async fn record(&self, event: SecurityEvent) {
        let result = sqlx::query(
            "INSERT INTO security_events (id, account_id, email, kind, detail, ip, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(uuidv7())
        .bind(event.account_id)
        .bind(&event.email)
        .bind(event.kind.as_str())
        .bind(&event.detail)
        .bind(&event.ip)
        .bind(&event.user_agent)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(kind = event.kind.as_str(), error = %e, "failed to record security event");
        }
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryEventSink {
    events: std::sync::Mutex<Vec<SecurityEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn record(&self, event: SecurityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// A persisted event row, newest-first from [`recent`].
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredEvent {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub email: Option<String>,
    pub kind: String,
    pub detail: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The most recent events, newest first. Read contract for the logs UI.
pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<StoredEvent>, sqlx::Error> {
    sqlx::query_as::<_, StoredEvent>(
        "SELECT id, account_id, email, kind, detail, ip, user_agent, created_at \
         FROM security_events ORDER BY created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
