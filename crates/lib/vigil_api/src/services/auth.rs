//! Authentication service — login/register/refresh flows composing the
//! core components.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use vigil_core::auth::lockout::{self, FailureOutcome};
use vigil_core::auth::tokens::TokenPair;
use vigil_core::auth::{AuthError, password, store};
use vigil_core::events::{EventKind, SecurityEvent};
use vigil_core::models::account::Account;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthContext;
use crate::middleware::client::ClientMeta;
use crate::models::{AccountResponse, IdentityResponse, TokenResponse};

/// Minimum password length at registration and password change.
const MIN_PASSWORD_LEN: usize = 8;

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> AppResult<()> {
    let valid = matches!(email.split_once('@'), Some((local, domain))
        if !local.is_empty()
            && !domain.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !email.contains(char::is_whitespace));
    if !valid {
        return Err(AppError::Validation("Invalid email address".into()));
    }
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn token_response(state: &AppState, account: &Account, pair: TokenPair) -> TokenResponse {
    TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: state.issuer.access_ttl_secs(),
        token_type: "Bearer".to_string(),
        user: IdentityResponse {
            id: account.id,
            email: account.email.clone(),
            role: account.role,
        },
    }
}

/// Authenticate with email + password.
///
/// Lock state is checked before the password verify; a locked account
/// gets the uniform locked response regardless of credential correctness.
pub async fn login(
    state: &AppState,
    email: &str,
    password_input: &str,
    client: &ClientMeta,
) -> AppResult<TokenResponse> {
    let now = Utc::now();

    let Some(account) = store::find_by_email(&state.pool, email).await? else {
        state
            .events
            .record(
                SecurityEvent::new(EventKind::LoginFailure)
                    .email(email)
                    .detail(json!({"reason": "unknown_email"}))
                    .client(client.ip.as_deref(), client.user_agent.as_deref()),
            )
            .await;
        return Err(AuthError::InvalidCredentials.into());
    };

    if let Some(until) = account.locked_until
        && now < until
    {
        return Err(AuthError::AccountLocked(until).into());
    }
    if !account.is_active {
        return Err(AuthError::AccountInactive.into());
    }
    if !account.is_verified {
        return Err(AuthError::AccountUnverified.into());
    }

    if !password::verify_password(password_input, &account.password_hash)? {
        let outcome = lockout::record_failure(
            &state.pool,
            &state.lockout,
            account.id,
            client.ip.as_deref(),
            client.user_agent.as_deref(),
            now,
        )
        .await?;

        state
            .events
            .record(
                SecurityEvent::new(EventKind::LoginFailure)
                    .account(account.id)
                    .email(&account.email)
                    .detail(json!({"reason": "bad_password"}))
                    .client(client.ip.as_deref(), client.user_agent.as_deref()),
            )
            .await;

        return Err(match outcome {
            FailureOutcome::Locked(until) => {
                state
                    .events
                    .record(
                        SecurityEvent::new(EventKind::AccountLocked)
                            .account(account.id)
                            .email(&account.email)
                            .detail(json!({"until": until.to_rfc3339()}))
                            .client(client.ip.as_deref(), client.user_agent.as_deref()),
                    )
                    .await;
                AuthError::AccountLocked(until).into()
            }
            FailureOutcome::Counted(_) => AuthError::InvalidCredentials.into(),
        });
    }

    lockout::reset(&state.pool, account.id).await?;

    let pair = state
        .issuer
        .issue_pair(account.id, &account.email, account.role)?;
    state
        .events
        .record(
            SecurityEvent::new(EventKind::LoginSuccess)
                .account(account.id)
                .email(&account.email)
                .client(client.ip.as_deref(), client.user_agent.as_deref()),
        )
        .await;
    info!(account = %account.id, "login");

    Ok(token_response(state, &account, pair))
}

/// Register a new account. Accounts start unverified with the `user` role
/// and cannot log in until verified.
pub async fn register(
    state: &AppState,
    email: &str,
    password_input: &str,
    client: &ClientMeta,
) -> AppResult<AccountResponse> {
    validate_email(email)?;
    validate_password(password_input)?;

    if store::email_exists(&state.pool, email).await? {
        return Err(AppError::Validation("Email already registered".into()));
    }

    let password_hash = password::hash_password(password_input)?;

    // The unique index is the real arbiter: a concurrent registration of
    // the same email loses here, not at the pre-check.
    let account = match store::create_account(&state.pool, email, &password_hash).await {
        Ok(account) => account,
        Err(AuthError::StoreUnavailable(e)) if is_unique_violation(&e) => {
            return Err(AppError::Validation("Email already registered".into()));
        }
        Err(e) => return Err(e.into()),
    };

    state
        .events
        .record(
            SecurityEvent::new(EventKind::AccountRegistered)
                .account(account.id)
                .email(&account.email)
                .client(client.ip.as_deref(), client.user_agent.as_deref()),
        )
        .await;
    info!(account = %account.id, "registered");

    Ok(AccountResponse {
        id: account.id,
        email: account.email,
        role: account.role,
        is_verified: account.is_verified,
    })
}

/// Exchange a refresh token for a brand-new pair.
///
/// The account is re-read so a role change or deactivation since issuance
/// is reflected. The refresh token rotates on every use; the old one is
/// not tracked and simply ages out (stateless scheme).
pub async fn refresh(state: &AppState, token: &str, client: &ClientMeta) -> AppResult<TokenResponse> {
    let claims = state.issuer.verify_refresh(token)?;

    let account = store::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !account.is_active {
        return Err(AuthError::AccountInactive.into());
    }
    if !account.is_verified {
        return Err(AuthError::AccountUnverified.into());
    }

    let pair = state
        .issuer
        .issue_pair(account.id, &account.email, account.role)?;
    state
        .events
        .record(
            SecurityEvent::new(EventKind::TokenRefreshed)
                .account(account.id)
                .email(&account.email)
                .client(client.ip.as_deref(), client.user_agent.as_deref()),
        )
        .await;

    Ok(token_response(state, &account, pair))
}

/// Stateless logout: records the event; the handler clears the cookie.
/// Outstanding tokens die at their natural expiry.
pub async fn logout(state: &AppState, ctx: &AuthContext, client: &ClientMeta) -> AppResult<()> {
    state
        .events
        .record(
            SecurityEvent::new(EventKind::Logout)
                .account(ctx.id)
                .email(&ctx.email)
                .client(client.ip.as_deref(), client.user_agent.as_deref()),
        )
        .await;
    Ok(())
}

/// Change the caller's password after re-verifying the current one.
pub async fn change_password(
    state: &AppState,
    ctx: &AuthContext,
    current: &str,
    new: &str,
    client: &ClientMeta,
) -> AppResult<()> {
    validate_password(new)?;

    let account = store::find_by_id(&state.pool, ctx.id)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !password::verify_password(current, &account.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    let password_hash = password::hash_password(new)?;
    store::update_password(&state.pool, ctx.id, &password_hash).await?;

    state
        .events
        .record(
            SecurityEvent::new(EventKind::PasswordChanged)
                .account(ctx.id)
                .email(&ctx.email)
                .client(client.ip.as_deref(), client.user_agent.as_deref()),
        )
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("first.last@sub.example.org").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a@").is_err());
        assert!(validate_email("a@nodot").is_err());
        assert!(validate_email("a b@x.com").is_err());
    }

    #[test]
    fn password_length_rule() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("1234567").is_err());
    }
}
