use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Storage backend for distributed locks.
///
/// Both operations must be atomic on the server side: a lock store that
/// checks and writes in two round trips is not a lock store.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Sets `key` to `token` with the given time-to-live, only if `key` is
    /// absent. Returns true when the key was set.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key` only if it still holds `token`. Returns true when the
    /// key was deleted.
    async fn delete_if_matches(&self, key: &str, token: &str) -> Result<bool>;
}

#[async_trait]
impl<T: LockStore + ?Sized> LockStore for Arc<T> {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        (**self).set_if_absent(key, token, ttl).await
    }

    async fn delete_if_matches(&self, key: &str, token: &str) -> Result<bool> {
        (**self).delete_if_matches(key, token).await
    }
}
