//! API key lifecycle.
//!
//! One active key per account, stored on the account row. Only the
//! SHA-256 hash is persisted; the plaintext is returned exactly once at
//! generation and never logged. Generating a new key overwrites (and so
//! invalidates) the previous one.

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use super::AuthError;
use super::store::{ACCOUNT_COLUMNS, AccountRow};
use crate::models::account::Account;

/// Generated key length in alphanumeric characters (~380 bits of entropy).
const KEY_LEN: usize = 64;

/// Generate a cryptographically random key.
fn generate_key() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a key for storage and lookup.
fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A freshly generated key. `plaintext` exists only in this value.
#[derive(Debug)]
pub struct GeneratedKey {
    pub plaintext: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a new API key for an account, replacing any existing one and
/// resetting the usage counter.
pub async fn generate(
    pool: &PgPool,
    account_id: Uuid,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<GeneratedKey, AuthError> {
    let plaintext = generate_key();
    let expires_at = now + ttl;

    let updated = sqlx::query(
        "UPDATE accounts SET api_key_hash = $2, api_key_expires_at = $3, \
         api_key_usage_count = 0, api_key_last_used_at = NULL, updated_at = now() \
         WHERE id = $1 AND is_active",
    )
    .bind(account_id)
    .bind(hash_key(&plaintext))
    .bind(expires_at)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AuthError::AccountInactive);
    }

    Ok(GeneratedKey {
        plaintext,
        expires_at,
    })
}

/// Verify an API key, counting the use.
///
/// A single atomic statement: the lookup is by hash, and the usage
/// counter / last-used timestamp update is the observable side effect of
/// success. Not-found, expired, and inactive-owner all collapse to
/// [`AuthError::ApiKeyInvalid`] so callers cannot enumerate which.
pub async fn verify(pool: &PgPool, key: &str, now: DateTime<Utc>) -> Result<Account, AuthError> {
    let query = format!(
        "UPDATE accounts SET api_key_usage_count = api_key_usage_count + 1, \
         api_key_last_used_at = $2 \
         WHERE api_key_hash = $1 AND is_active AND api_key_expires_at > $2 \
         RETURNING {ACCOUNT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, AccountRow>(&query)
        .bind(hash_key(key))
        .bind(now)
        .fetch_optional(pool)
        .await?;

    row.map(Account::from).ok_or(AuthError::ApiKeyInvalid)
}

/// Drop the account's key, if any.
pub async fn revoke(pool: &PgPool, account_id: Uuid) -> Result<(), AuthError> {
    sqlx::query(
        "UPDATE accounts SET api_key_hash = NULL, api_key_expires_at = NULL, \
         api_key_usage_count = 0, api_key_last_used_at = NULL, updated_at = now() \
         WHERE id = $1",
    )
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.len(), KEY_LEN);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let key = "abc123";
        let h1 = hash_key(key);
        let h2 = hash_key(key);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash_key("abc124"), h1);
    }
}
