//! Request rate limiting.
//!
//! A configuration-driven table of per-category policies enforced against
//! a shared counter store. Windows are fixed and epoch-aligned. Exceeding
//! a budget applies the category's block, which outlives window rollover;
//! until it expires every call from that identity is denied.

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use store::{CounterStore, StoreError};

/// Request categories with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Api,
    Auth,
    Ai,
    Admin,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::Api, Category::Auth, Category::Ai, Category::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Api => "api",
            Category::Auth => "auth",
            Category::Ai => "ai",
            Category::Admin => "admin",
        }
    }
}

/// Budget for one category.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Requests allowed per window.
    pub budget: u32,
    /// Window length.
    pub window: Duration,
    /// Escalated block once the budget is exceeded. `None` denies only to
    /// the end of the current window.
    pub block: Option<Duration>,
}

/// What to do when the counter store is unreachable.
///
/// No `Default` on purpose: every deployment must choose between
/// fail-open and fail-closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Open,
    Closed,
}

impl FailurePolicy {
    pub fn parse(s: &str) -> Option<FailurePolicy> {
        match s {
            "open" => Some(FailurePolicy::Open),
            "closed" => Some(FailurePolicy::Closed),
            _ => None,
        }
    }
}

/// Full limiter configuration, one policy per category.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub api: Policy,
    pub auth: Policy,
    pub ai: Policy,
    pub admin: Policy,
    pub on_store_failure: FailurePolicy,
}

impl RateLimitConfig {
    /// Conventional budgets. The failure policy is always explicit.
    pub fn with_defaults(on_store_failure: FailurePolicy) -> Self {
        Self {
            api: Policy {
                budget: 100,
                window: Duration::seconds(60),
                block: None,
            },
            auth: Policy {
                budget: 10,
                window: Duration::seconds(60),
                block: Some(Duration::seconds(300)),
            },
            ai: Policy {
                budget: 20,
                window: Duration::seconds(60),
                block: Some(Duration::seconds(60)),
            },
            admin: Policy {
                budget: 30,
                window: Duration::seconds(60),
                block: None,
            },
            on_store_failure,
        }
    }

    pub fn policy(&self, category: Category) -> &Policy {
        match category {
            Category::Api => &self.api,
            Category::Auth => &self.auth,
            Category::Ai => &self.ai,
            Category::Admin => &self.admin,
        }
    }
}

/// Outcome of a consume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        /// Budget left in the current window.
        remaining: u32,
        /// When the window rolls over.
        reset: DateTime<Utc>,
    },
    Denied {
        /// Seconds until the caller may retry.
        retry_after: i64,
        /// When the block or window ends.
        reset: DateTime<Utc>,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Shared-store rate limiter, constructed once at startup.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    /// The configured budget for a category.
    pub fn limit(&self, category: Category) -> u32 {
        self.config.policy(category).budget
    }

    /// Count one request against `(category, identity)`.
    ///
    /// A store failure never propagates; it resolves per the configured
    /// [`FailurePolicy`].
    pub async fn consume(
        &self,
        category: Category,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Decision {
        let policy = self.config.policy(category);
        let key = format!("{}:{}", category.as_str(), identity);

        match self.try_consume(policy, &key, now).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(category = category.as_str(), error = %e, "counter store failed");
                match self.config.on_store_failure {
                    FailurePolicy::Open => Decision::Allowed {
                        remaining: policy.budget,
                        reset: now + policy.window,
                    },
                    FailurePolicy::Closed => Decision::Denied {
                        retry_after: policy.window.num_seconds(),
                        reset: now + policy.window,
                    },
                }
            }
        }
    }

    /// Drop state older than `before` from the backing store.
    pub async fn purge(&self, before: DateTime<Utc>) -> Result<(), StoreError> {
        self.store.purge(before).await
    }

    async fn try_consume(
        &self,
        policy: &Policy,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, StoreError> {
        // An active block denies regardless of window state.
        if let Some(until) = self.store.blocked_until(key).await?
            && now < until
        {
            return Ok(Decision::Denied {
                retry_after: (until - now).num_seconds().max(1),
                reset: until,
            });
        }

        let window_secs = policy.window.num_seconds().max(1);
        let window_start_ts = now.timestamp() - now.timestamp().rem_euclid(window_secs);
        let window_start = DateTime::from_timestamp(window_start_ts, 0).unwrap_or(now);
        let window_end = window_start + policy.window;

        let points = self.store.increment(key, window_start).await?;

        if points > u64::from(policy.budget) {
            let (retry_after, reset) = match policy.block {
                Some(block) => {
                    let until = now + block;
                    self.store.set_block(key, until).await?;
                    (block.num_seconds(), until)
                }
                None => ((window_end - now).num_seconds().max(1), window_end),
            };
            return Ok(Decision::Denied { retry_after, reset });
        }

        Ok(Decision::Allowed {
            remaining: policy.budget.saturating_sub(points as u32),
            reset: window_end,
        })
    }
}
