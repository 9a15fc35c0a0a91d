//! Credential store queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::AuthError;
use crate::models::account::Account;
use crate::rbac::Role;

/// Columns selected into [`AccountRow`]. The API key hash is never
/// selected.
pub(crate) const ACCOUNT_COLUMNS: &str = "id, email, password_hash, role, is_verified, is_active, \
     failed_login_attempts, locked_until, api_key_expires_at, \
     api_key_usage_count, api_key_last_used_at, created_at, updated_at";

/// Raw account row. `role` stays text until [`Role::parse`] downgrades
/// unknown values to `user`.
#[derive(sqlx::FromRow)]
pub(crate) struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub api_key_expires_at: Option<DateTime<Utc>>,
    pub api_key_usage_count: i64,
    pub api_key_last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role: Role::parse(&row.role),
            is_verified: row.is_verified,
            is_active: row.is_active,
            failed_login_attempts: row.failed_login_attempts,
            locked_until: row.locked_until,
            api_key_expires_at: row.api_key_expires_at,
            api_key_usage_count: row.api_key_usage_count,
            api_key_last_used_at: row.api_key_last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fetch an account by email (case-insensitive).
pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Account>, AuthError> {
    let query =
        format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = lower($1)");
    let row = sqlx::query_as::<_, AccountRow>(&query)
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Account::from))
}

/// Fetch an account by id.
pub async fn find_by_id(pool: &PgPool, account_id: Uuid) -> Result<Option<Account>, AuthError> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
    let row = sqlx::query_as::<_, AccountRow>(&query)
        .bind(account_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Account::from))
}

/// Check whether an email is already registered (case-insensitive).
pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, AuthError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE lower(email) = lower($1))",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Create a new account with the default `user` role, unverified.
pub async fn create_account(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
) -> Result<Account, AuthError> {
    let query = format!(
        "INSERT INTO accounts (email, password_hash) VALUES ($1, $2) RETURNING {ACCOUNT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, AccountRow>(&query)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .await?;
    Ok(row.into())
}

/// Mark an account verified. Returns false when no such account exists.
pub async fn mark_verified(pool: &PgPool, account_id: Uuid) -> Result<bool, AuthError> {
    let result =
        sqlx::query("UPDATE accounts SET is_verified = TRUE, updated_at = now() WHERE id = $1")
            .bind(account_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Soft-activate or deactivate an account. Accounts are never hard-deleted.
pub async fn set_active(pool: &PgPool, account_id: Uuid, active: bool) -> Result<bool, AuthError> {
    let result =
        sqlx::query("UPDATE accounts SET is_active = $2, updated_at = now() WHERE id = $1")
            .bind(account_id)
            .bind(active)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace an account's password hash.
pub async fn update_password(
    pool: &PgPool,
    account_id: Uuid,
    password_hash: &str,
) -> Result<(), AuthError> {
    sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(account_id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}
