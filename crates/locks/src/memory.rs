use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Result, store::LockStore};

#[derive(Debug, Clone)]
struct LockEntry {
    token: String,
    expires_at: Instant,
}

/// In-memory lock store for tests and single-process deployments.
///
/// Expired entries are treated as absent and overwritten on the next
/// acquire; there is no background sweeper. Uses the tokio clock so tests
/// can advance time with `tokio::time::pause`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    entries: Arc<Mutex<HashMap<String, LockEntry>>>,
}

impl InMemoryLockStore {
    /// Creates a new empty lock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token currently holding `key`, if the lock is live.
    pub async fn holder(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.token.clone())
    }

    /// Returns the number of live locks.
    pub async fn live_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some(existing) = entries.get(key)
            && existing.expires_at > now
        {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            LockEntry {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_matches(&self, key: &str, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(existing) if existing.token == token && existing.expires_at > Instant::now() => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
