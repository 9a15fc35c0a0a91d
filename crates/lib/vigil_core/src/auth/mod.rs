//! Authentication and abuse-control logic.
//!
//! Password hashing, token issuance, lockout tracking, API key
//! management, and the credential store queries shared by the HTTP layer.

pub mod api_keys;
pub mod lockout;
pub mod password;
pub mod store;
pub mod tokens;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Authentication errors.
///
/// The HTTP layer collapses most variants into opaque 401 responses; the
/// distinctions exist for internal logging and tests, not for clients.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account locked until {0}")]
    AccountLocked(DateTime<Utc>),

    #[error("Account is deactivated")]
    AccountInactive,

    #[error("Account is not verified")]
    AccountUnverified,

    #[error("Token expired")]
    TokenExpired,

    #[error("Malformed token")]
    TokenMalformed,

    #[error("Invalid API key")]
    ApiKeyInvalid,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
