//! Application error types.
//!
//! Credential, account, and token failures all collapse to the same
//! opaque 401 bodies; which one actually happened is logged here, never
//! returned to the client. 429 responses are the exception and carry
//! their retry metadata in standard headers.

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::debug;

use vigil_core::auth::AuthError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Rate limited; retry after {retry_after}s")]
    RateLimited {
        retry_after: i64,
        limit: u32,
        reset: i64,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.clone()),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "Insufficient permissions".to_string(),
            ),
            AppError::RateLimited { retry_after, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("Too many requests. Retry in {retry_after}s"),
            ),
            AppError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "Service temporarily unavailable".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });
        let mut response = (status, body).into_response();

        if let AppError::RateLimited {
            retry_after,
            limit,
            reset,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.max(0) as u64),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(limit),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(0u16),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-reset"),
                HeaderValue::from(reset.max(0) as u64),
            );
        }

        response
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::AccountInactive
            | AuthError::AccountUnverified => {
                debug!(cause = %e, "authentication rejected");
                AppError::Unauthorized("Invalid email or password".into())
            }
            AuthError::AccountLocked(until) => {
                debug!(%until, "authentication rejected: account locked");
                AppError::Unauthorized("Account temporarily locked. Try again later.".into())
            }
            AuthError::TokenExpired | AuthError::TokenMalformed => {
                debug!(cause = %e, "token rejected");
                AppError::Unauthorized("Invalid or expired token".into())
            }
            AuthError::ApiKeyInvalid => AppError::Unauthorized("Invalid API key".into()),
            AuthError::Validation(m) => AppError::Validation(m),
            AuthError::StoreUnavailable(e) => AppError::StoreUnavailable(e.to_string()),
            AuthError::Internal(m) => AppError::Internal(m),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            _ => AppError::StoreUnavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn auth_errors_collapse_to_opaque_401() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::AccountInactive,
            AuthError::AccountUnverified,
        ] {
            let app: AppError = err.into();
            let AppError::Unauthorized(message) = &app else {
                panic!("expected Unauthorized, got {app:?}");
            };
            assert_eq!(message, "Invalid email or password");
        }
    }

    #[test]
    fn token_errors_are_indistinguishable_to_clients() {
        let expired: AppError = AuthError::TokenExpired.into();
        let malformed: AppError = AuthError::TokenMalformed.into();
        let (AppError::Unauthorized(a), AppError::Unauthorized(b)) = (&expired, &malformed) else {
            panic!("expected Unauthorized");
        };
        assert_eq!(a, b);
    }

    #[test]
    fn locked_account_gets_uniform_locked_message() {
        let app: AppError = AuthError::AccountLocked(Utc::now()).into();
        let AppError::Unauthorized(message) = &app else {
            panic!("expected Unauthorized");
        };
        assert!(message.contains("locked"));
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Validation("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::StoreUnavailable("x".into())
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn rate_limited_carries_standard_headers() {
        let response = AppError::RateLimited {
            retry_after: 30,
            limit: 10,
            reset: 1_700_000_060,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "30");
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "10");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert_eq!(headers.get("x-ratelimit-reset").unwrap(), "1700000060");
    }
}
