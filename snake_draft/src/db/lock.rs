//! Expiring mutual-exclusion locks.
//!
//! Used for the per-(contest,user) admission lock and the per-user "pick in
//! flight" token. A lock is a row keyed by name holding a random token and an
//! expiry; an expired row can be taken over by the next caller, so a crashed
//! holder never wedges a key for longer than its TTL.

use super::errors::StoreResult;
use super::timeouts::with_default_timeout;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Proof of lock ownership, required to release it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub token: Uuid,
}

/// Expiring lock service
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Try to take `key` for `ttl`. Returns `None` when another holder owns
    /// an unexpired lock.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StoreResult<Option<LockToken>>;

    /// Release a lock. Releasing a lock that expired and was taken over by
    /// someone else is a no-op.
    async fn release(&self, token: &LockToken) -> StoreResult<()>;
}

/// Admission lock key for a (contest, user) pair
pub fn admission_key(contest_id: i64, user_id: i64) -> String {
    format!("contest_entry:{contest_id}:{user_id}")
}

/// Pick-in-flight key for a user in a room
pub fn pick_key(room_id: i64, user_id: i64) -> String {
    format!("pick:{room_id}:{user_id}")
}

/// PostgreSQL-backed lock manager (table `draft_locks`)
#[derive(Clone)]
pub struct PgLockManager {
    pool: Arc<PgPool>,
}

impl PgLockManager {
    /// Create a new lock manager
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockManager for PgLockManager {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StoreResult<Option<LockToken>> {
        let token = Uuid::new_v4();

        // Insert, or take over only if the current holder has expired
        let row = with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO draft_locks (lock_key, token, expires_at)
                VALUES ($1, $2, NOW() + make_interval(secs => $3))
                ON CONFLICT (lock_key) DO UPDATE
                    SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
                    WHERE draft_locks.expires_at <= NOW()
                RETURNING token
                "#,
            )
            .bind(key)
            .bind(token)
            .bind(ttl.as_secs_f64())
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.map(|_| LockToken {
            key: key.to_string(),
            token,
        }))
    }

    async fn release(&self, token: &LockToken) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("DELETE FROM draft_locks WHERE lock_key = $1 AND token = $2")
                .bind(&token.key)
                .bind(token.token)
                .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }
}

/// In-process lock manager for single-node deployments and tests
#[derive(Clone, Default)]
pub struct MemoryLockManager {
    locks: Arc<Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>>,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held
    pub async fn is_held(&self, key: &str) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > Utc::now())
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StoreResult<Option<LockToken>> {
        let mut locks = self.locks.lock().await;
        let now = Utc::now();

        if let Some((_, expires_at)) = locks.get(key)
            && *expires_at > now
        {
            return Ok(None);
        }

        let token = Uuid::new_v4();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(1));
        locks.insert(key.to_string(), (token, now + ttl));

        Ok(Some(LockToken {
            key: key.to_string(),
            token,
        }))
    }

    async fn release(&self, token: &LockToken) -> StoreResult<()> {
        let mut locks = self.locks.lock().await;
        if locks.get(&token.key).is_some_and(|(t, _)| *t == token.token) {
            locks.remove(&token.key);
        }
        Ok(())
    }
}
