//! API server configuration.

use std::path::PathBuf;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use thiserror::Error;
use tracing::{info, warn};

use vigil_core::ratelimit::{FailurePolicy, Policy, RateLimitConfig};

/// Configuration errors surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RATE_LIMIT_FAIL_POLICY must be set to 'open' or 'closed'")]
    FailPolicyRequired,

    #[error("invalid value for {0}: {1:?}")]
    Invalid(String, String),
}

/// Configuration for the auth service.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3400").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access token signing secret.
    pub access_secret: String,
    /// Refresh token signing secret (distinct from the access secret).
    pub refresh_secret: String,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: i64,
    /// Consecutive failed logins before an account locks.
    pub lockout_threshold: u32,
    /// Lock length in seconds.
    pub lockout_duration_secs: i64,
    /// API key lifetime in days.
    pub api_key_ttl_days: i64,
    /// Per-category rate limiting.
    pub rate_limits: RateLimitConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                                     | Default                           |
    /// |----------------------------------------------|-----------------------------------|
    /// | `BIND_ADDR`                                  | `127.0.0.1:3400`                  |
    /// | `DATABASE_URL`                               | `postgres://localhost:5432/vigil` |
    /// | `ACCESS_TOKEN_SECRET`                        | generated & persisted to file     |
    /// | `REFRESH_TOKEN_SECRET`                       | generated & persisted to file     |
    /// | `ACCESS_TOKEN_TTL_SECS`                      | `3600`                            |
    /// | `REFRESH_TOKEN_TTL_SECS`                     | `604800` (7 days)                 |
    /// | `LOCKOUT_THRESHOLD`                          | `10`                              |
    /// | `LOCKOUT_DURATION_SECS`                      | `3600`                            |
    /// | `API_KEY_TTL_DAYS`                           | `30`                              |
    /// | `RATE_LIMIT_{API,AUTH,AI,ADMIN}_MAX`         | `100` / `10` / `20` / `30`        |
    /// | `RATE_LIMIT_{API,AUTH,AI,ADMIN}_WINDOW_SECS` | `60`                              |
    /// | `RATE_LIMIT_{API,AUTH,AI,ADMIN}_BLOCK_SECS`  | `0` / `300` / `60` / `0`          |
    /// | `RATE_LIMIT_FAIL_POLICY`                     | **required**: `open` or `closed`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_secret = resolve_secret("ACCESS_TOKEN_SECRET", "access-token-secret");
        let refresh_secret = resolve_secret("REFRESH_TOKEN_SECRET", "refresh-token-secret");
        if access_secret == refresh_secret {
            warn!(
                "access and refresh token secrets are identical; \
                 compromise of one forges both families"
            );
        }

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:3400"),
            database_url: env_or("DATABASE_URL", "postgres://localhost:5432/vigil"),
            access_secret,
            refresh_secret,
            access_ttl_secs: env_parsed("ACCESS_TOKEN_TTL_SECS", 3600)?,
            refresh_ttl_secs: env_parsed("REFRESH_TOKEN_TTL_SECS", 604_800)?,
            lockout_threshold: env_parsed("LOCKOUT_THRESHOLD", 10)?,
            lockout_duration_secs: env_parsed("LOCKOUT_DURATION_SECS", 3600)?,
            api_key_ttl_days: env_parsed("API_KEY_TTL_DAYS", 30)?,
            rate_limits: rate_limits_from_env()?,
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_parsed<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(var.to_string(), raw)),
        _ => Ok(default),
    }
}

/// Build the per-category limiter table from the environment.
///
/// The failure policy is the one setting without a default.
fn rate_limits_from_env() -> Result<RateLimitConfig, ConfigError> {
    let raw =
        std::env::var("RATE_LIMIT_FAIL_POLICY").map_err(|_| ConfigError::FailPolicyRequired)?;
    let on_store_failure = FailurePolicy::parse(&raw)
        .ok_or_else(|| ConfigError::Invalid("RATE_LIMIT_FAIL_POLICY".into(), raw))?;

    let mut config = RateLimitConfig::with_defaults(on_store_failure);
    config.api = policy_from_env("API", &config.api)?;
    config.auth = policy_from_env("AUTH", &config.auth)?;
    config.ai = policy_from_env("AI", &config.ai)?;
    config.admin = policy_from_env("ADMIN", &config.admin)?;
    Ok(config)
}

fn policy_from_env(name: &str, default: &Policy) -> Result<Policy, ConfigError> {
    let budget = env_parsed(&format!("RATE_LIMIT_{name}_MAX"), default.budget)?;
    let window_secs = env_parsed(
        &format!("RATE_LIMIT_{name}_WINDOW_SECS"),
        default.window.num_seconds(),
    )?;
    let block_secs = env_parsed(
        &format!("RATE_LIMIT_{name}_BLOCK_SECS"),
        default.block.map_or(0, |d| d.num_seconds()),
    )?;
    Ok(Policy {
        budget,
        window: chrono::Duration::seconds(window_secs.max(1)),
        block: (block_secs > 0).then(|| chrono::Duration::seconds(block_secs)),
    })
}

/// Resolve a signing secret: env var, then persisted file, else generate
/// and persist. Each token family resolves through its own file.
fn resolve_secret(var: &str, file_name: &str) -> String {
    if let Ok(secret) = std::env::var(var)
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), var, "generated new signing secret");
    secret
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vigil")
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsed_falls_back_to_default() {
        let value: u32 = env_parsed("VIGIL_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn policy_from_env_keeps_defaults_when_unset() {
        let default = Policy {
            budget: 10,
            window: chrono::Duration::seconds(60),
            block: Some(chrono::Duration::seconds(300)),
        };
        let policy = policy_from_env("VIGIL_TEST_UNSET", &default).unwrap();
        assert_eq!(policy.budget, 10);
        assert_eq!(policy.window, chrono::Duration::seconds(60));
        assert_eq!(policy.block, Some(chrono::Duration::seconds(300)));
    }
}
