use std::time::Duration;

use uuid::Uuid;

use crate::{Result, store::LockStore};

/// How often and how long to retry a busy lock before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of acquire attempts (at least one is always made).
    pub attempts: u32,
    /// Delay between two attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

/// A single-key distributed lock.
///
/// Each instance carries its own random token; only that token can release
/// the key. The lock is not renewed: if the critical section outlives the
/// TTL, mutual exclusion is lost and a later release becomes a no-op.
#[derive(Debug, Clone)]
pub struct DistributedLock<L> {
    store: L,
    key: String,
    token: String,
    ttl: Duration,
}

impl<L: LockStore> DistributedLock<L> {
    /// Creates a lock handle for `key` with a fresh token. Nothing is
    /// acquired yet.
    pub fn new(store: L, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            token: Uuid::new_v4().simple().to_string(),
            ttl,
        }
    }

    /// Returns the lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the ownership token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the lock time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Makes one attempt to take the lock.
    pub async fn acquire(&self) -> Result<bool> {
        self.store
            .set_if_absent(&self.key, &self.token, self.ttl)
            .await
    }

    /// Attempts to take the lock up to `policy.attempts` times.
    ///
    /// Returns `Ok(false)` when every attempt found the lock held; store
    /// failures are returned immediately.
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub async fn try_acquire(&self, policy: RetryPolicy) -> Result<bool> {
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            if self.acquire().await? {
                tracing::debug!(attempt, "lock acquired");
                return Ok(true);
            }
            if attempt < attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        metrics::counter!("lock_busy_total").increment(1);
        tracing::debug!(attempts, "lock still held after retries");
        Ok(false)
    }

    /// Releases the lock if this handle still owns it.
    ///
    /// Returns false when the key had already expired or been taken over.
    pub async fn release(&self) -> Result<bool> {
        let released = self.store.delete_if_matches(&self.key, &self.token).await?;
        if !released {
            tracing::warn!(key = %self.key, "lock was no longer owned at release");
        }
        Ok(released)
    }
}
