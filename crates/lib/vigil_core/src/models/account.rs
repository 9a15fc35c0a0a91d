//! Account domain model.
//!
//! These are internal domain models, distinct from the API wire types
//! (which carry `#[serde(rename)]` for camelCase etc.).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::rbac::Role;

/// A user account as read from the credential store.
///
/// The API key hash never leaves the store; verification happens there
/// by hash lookup.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
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

impl Account {
    /// Whether the account is currently locked out of login.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Whether the account holds an unexpired API key.
    pub fn api_key_active(&self, now: DateTime<Utc>) -> bool {
        self.api_key_expires_at.is_some_and(|expires| now < expires)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;

    fn account() -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            password_hash: "$2b$12$hash".into(),
            role: Role::User,
            is_verified: true,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            api_key_expires_at: None,
            api_key_usage_count: 0,
            api_key_last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lock_expires() {
        let now = Utc::now();
        let mut acct = account();
        acct.locked_until = Some(now + Duration::hours(1));
        assert!(acct.is_locked(now));
        assert!(!acct.is_locked(now + Duration::seconds(3601)));
    }

    #[test]
    fn api_key_expires() {
        let now = Utc::now();
        let mut acct = account();
        assert!(!acct.api_key_active(now));
        acct.api_key_expires_at = Some(now + Duration::days(30));
        assert!(acct.api_key_active(now));
        // One second past the TTL the key is dead.
        assert!(!acct.api_key_active(now + Duration::days(30) + Duration::seconds(1)));
    }
}
