//! Brute-force lockout tracking.
//!
//! A pure per-account state machine, applied to the stored counters under
//! a row lock so two parallel failures cannot both observe the
//! pre-threshold count and race past it. Callers check lock state before
//! verifying the password; failures while locked never reach the machine.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::AuthError;
use crate::uuid::uuidv7;

/// How many consecutive failures trip the lock, and for how long.
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 10,
            duration: Duration::hours(1),
        }
    }
}

/// Per-account lockout state as read from the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockState {
    /// Whether the account is locked at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// State after a failed attempt.
    ///
    /// A lock that has expired starts a fresh count at 1; crossing the
    /// threshold sets `locked_until`. While locked the state is frozen —
    /// the count never grows past the threshold.
    pub fn on_failure(&self, now: DateTime<Utc>, policy: &LockoutPolicy) -> LockState {
        if self.is_locked(now) {
            return *self;
        }
        let failed_attempts = if self.locked_until.is_some() {
            1
        } else {
            self.failed_attempts + 1
        };
        let locked_until = (failed_attempts >= policy.threshold).then(|| now + policy.duration);
        LockState {
            failed_attempts,
            locked_until,
        }
    }

    /// State after a successful login: counter cleared, lock removed.
    pub fn on_success(&self) -> LockState {
        LockState {
            failed_attempts: 0,
            locked_until: None,
        }
    }
}

/// Result of recording a login failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Failure counted; total consecutive failures so far.
    Counted(u32),
    /// This failure tripped the lock.
    Locked(DateTime<Utc>),
}

/// Record a failed login attempt and append its audit row.
///
/// Runs in a transaction with the account row locked, so concurrent
/// failures for the same account serialize and exactly one of them trips
/// the lock.
pub async fn record_failure(
    pool: &PgPool,
    policy: &LockoutPolicy,
    account_id: Uuid,
    ip: Option<&str>,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
) -> Result<FailureOutcome, AuthError> {
    let mut tx = pool.begin().await?;

    let (failed, locked_until) = sqlx::query_as::<_, (i32, Option<DateTime<Utc>>)>(
        "SELECT failed_login_attempts, locked_until FROM accounts WHERE id = $1 FOR UPDATE",
    )
    .bind(account_id)
    .fetch_one(&mut *tx)
    .await?;

    let state = LockState {
        failed_attempts: failed.max(0) as u32,
        locked_until,
    };
    let next = state.on_failure(now, policy);

    sqlx::query(
        "UPDATE accounts SET failed_login_attempts = $2, locked_until = $3, updated_at = now() \
         WHERE id = $1",
    )
    .bind(account_id)
    .bind(next.failed_attempts as i32)
    .bind(next.locked_until)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO login_failures (id, account_id, ip, user_agent, created_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(uuidv7())
    .bind(account_id)
    .bind(ip)
    .bind(user_agent)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(match next.locked_until {
        Some(until) => FailureOutcome::Locked(until),
        None => FailureOutcome::Counted(next.failed_attempts),
    })
}

/// Clear the failure counter and any lock after a successful login (or an
/// admin unlock).
pub async fn reset(pool: &PgPool, account_id: Uuid) -> Result<(), AuthError> {
    sqlx::query(
        "UPDATE accounts SET failed_login_attempts = 0, locked_until = NULL, updated_at = now() \
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

    fn policy() -> LockoutPolicy {
        LockoutPolicy::default()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn failures_count_up_below_threshold() {
        let mut state = LockState {
            failed_attempts: 0,
            locked_until: None,
        };
        for i in 1..10 {
            state = state.on_failure(at(0), &policy());
            assert_eq!(state.failed_attempts, i);
            assert!(!state.is_locked(at(0)));
        }
    }

    #[test]
    fn tenth_failure_trips_the_lock() {
        let state = LockState {
            failed_attempts: 9,
            locked_until: None,
        };
        let next = state.on_failure(at(0), &policy());
        assert_eq!(next.failed_attempts, 10);
        assert_eq!(next.locked_until, Some(at(3600)));
        // Still locked 10 seconds in, regardless of credentials.
        assert!(next.is_locked(at(10)));
    }

    #[test]
    fn lock_is_frozen_while_active() {
        let locked = LockState {
            failed_attempts: 10,
            locked_until: Some(at(3600)),
        };
        let next = locked.on_failure(at(100), &policy());
        assert_eq!(next, locked);
    }

    #[test]
    fn expired_lock_starts_fresh_count_on_failure() {
        let locked = LockState {
            failed_attempts: 10,
            locked_until: Some(at(3600)),
        };
        let next = locked.on_failure(at(3601), &policy());
        assert_eq!(next.failed_attempts, 1);
        assert_eq!(next.locked_until, None);
    }

    #[test]
    fn success_resets_counter_to_zero() {
        let state = LockState {
            failed_attempts: 7,
            locked_until: None,
        };
        assert_eq!(
            state.on_success(),
            LockState {
                failed_attempts: 0,
                locked_until: None
            }
        );

        // Success after the lock expires clears everything too.
        let locked = LockState {
            failed_attempts: 10,
            locked_until: Some(at(3600)),
        };
        assert!(!locked.is_locked(at(3601)));
        assert_eq!(locked.on_success().failed_attempts, 0);
    }

    #[test]
    fn lock_expiry_boundary() {
        let locked = LockState {
            failed_attempts: 10,
            locked_until: Some(at(3600)),
        };
        assert!(locked.is_locked(at(3599)));
        assert!(!locked.is_locked(at(3600)));
    }
}
