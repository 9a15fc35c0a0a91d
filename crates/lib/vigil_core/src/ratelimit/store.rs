//! Counter storage backends for the rate limiter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use thiserror::Error;

/// Counter store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Atomic counters shared by every request-handling unit.
///
/// `increment` must be atomic per key: the limiter never
/// read-modify-writes, so concurrent requests from the same identity
/// cannot under-count a bucket.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment and return the counter for `key` in the window starting
    /// at `window_start`.
    async fn increment(
        &self,
        key: &str,
        window_start: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// The current block for `key`, if any.
    async fn blocked_until(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Block `key` until `until`.
    async fn set_block(&self, key: &str, until: DateTime<Utc>) -> Result<(), StoreError>;

    /// Drop windows and blocks that ended before `before`.
    async fn purge(&self, before: DateTime<Utc>) -> Result<(), StoreError>;
}

/// PostgreSQL-backed store. Increments are single upsert statements, so
/// atomicity comes from the database.
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(
        &self,
        key: &str,
        window_start: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let points = sqlx::query_scalar::<_, i64>(
            "INSERT INTO rate_limit_buckets (key, window_start, points) VALUES ($1, $2, 1) \
             ON CONFLICT (key, window_start) \
             DO UPDATE SET points = rate_limit_buckets.points + 1 \
             RETURNING points",
        )
        .bind(key)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;
        Ok(points.max(0) as u64)
    }

    async fn blocked_until(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let until = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT blocked_until FROM rate_limit_blocks WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(until)
    }

    async fn set_block(&self, key: &str, until: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO rate_limit_blocks (key, blocked_until) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET blocked_until = EXCLUDED.blocked_until",
        )
        .bind(key)
        .bind(until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge(&self, before: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM rate_limit_buckets WHERE window_start < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM rate_limit_blocks WHERE blocked_until < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory store for tests and single-node deployments. Entry-level
/// locking in the map makes each increment atomic.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: DashMap<(String, i64), u64>,
    blocks: DashMap<String, DateTime<Utc>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(
        &self,
        key: &str,
        window_start: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut entry = self
            .counters
            .entry((key.to_string(), window_start.timestamp()))
            .or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn blocked_until(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.blocks.get(key).map(|until| *until))
    }

    async fn set_block(&self, key: &str, until: DateTime<Utc>) -> Result<(), StoreError> {
        self.blocks.insert(key.to_string(), until);
        Ok(())
    }

    async fn purge(&self, before: DateTime<Utc>) -> Result<(), StoreError> {
        let cutoff = before.timestamp();
        self.counters.retain(|(_, window_start), _| *window_start >= cutoff);
        self.blocks.retain(|_, until| *until >= before);
        Ok(())
    }
}
