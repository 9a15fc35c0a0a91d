//! # vigil_api
//!
//! HTTP surface for the Vigil auth service.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use vigil_core::auth::lockout::LockoutPolicy;
use vigil_core::auth::tokens::TokenIssuer;
use vigil_core::events::{EventSink, PgEventSink};
use vigil_core::ratelimit::RateLimiter;
use vigil_core::ratelimit::store::PgCounterStore;

use crate::config::ApiConfig;
use crate::handlers::{admin, api_keys, auth};
use crate::middleware::auth::{require_auth, require_events_view, require_users_manage};
use crate::middleware::rate_limit::{limit_admin, limit_api, limit_auth};

/// Shared application state passed to all handlers.
///
/// Every component is injected here at construction — there is no
/// process-global state to reach for.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool (credential store + audit tables).
    pub pool: PgPool,
    /// API configuration.
    pub config: ApiConfig,
    /// Token issuer (pure; holds both signing secrets).
    pub issuer: TokenIssuer,
    /// Lockout policy applied on failed logins.
    pub lockout: LockoutPolicy,
    /// Per-category rate limiter.
    pub limiter: RateLimiter,
    /// Security event sink.
    pub events: Arc<dyn EventSink>,
}

impl AppState {
    /// Wire the state from configuration with the Postgres-backed stores.
    pub fn new(pool: PgPool, config: ApiConfig) -> Self {
        let issuer = TokenIssuer::new(
            &config.access_secret,
            &config.refresh_secret,
            config.access_ttl_secs,
            config.refresh_ttl_secs,
        );
        let lockout = LockoutPolicy {
            threshold: config.lockout_threshold,
            duration: chrono::Duration::seconds(config.lockout_duration_secs),
        };
        let limiter = RateLimiter::new(
            config.rate_limits.clone(),
            Arc::new(PgCounterStore::new(pool.clone())),
        );
        let events = Arc::new(PgEventSink::new(pool.clone()));
        Self {
            pool,
            config,
            issuer,
            lockout,
            limiter,
            events,
        }
    }
}

/// Run embedded database migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    vigil_core::migrate::migrate(pool).await
}

/// Builds the axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public credential routes: the strict auth category runs first,
    // keyed by client IP since no identity exists yet.
    let public = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .layer(from_fn_with_state(state.clone(), limit_auth));

    // Authenticated routes: auth runs first so the api category keys by
    // account id.
    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/password", put(auth::change_password_handler))
        .route(
            "/auth/api-key",
            post(api_keys::generate_handler)
                .get(api_keys::status_handler)
                .delete(api_keys::revoke_handler),
        )
        .layer(from_fn_with_state(state.clone(), limit_api))
        .layer(from_fn_with_state(state.clone(), require_auth));

    // Admin routes: auth → admin category → capability guard.
    let admin_accounts = Router::new()
        .route(
            "/admin/accounts/{id}/unlock",
            post(admin::unlock_account_handler),
        )
        .route(
            "/admin/accounts/{id}/verify",
            post(admin::verify_account_handler),
        )
        .route(
            "/admin/accounts/{id}/active",
            put(admin::set_active_handler),
        )
        .layer(from_fn_with_state(state.clone(), require_users_manage));

    let admin_events = Router::new()
        .route("/admin/events", get(admin::list_events_handler))
        .layer(from_fn_with_state(state.clone(), require_events_view));

    let admin_routes = Router::new()
        .merge(admin_accounts)
        .merge(admin_events)
        .layer(from_fn_with_state(state.clone(), limit_admin))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin_routes)
        .layer(cors)
        .with_state(state)
}
