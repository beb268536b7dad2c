use std::time::Duration;

use common::GoodsId;

use crate::{DistributedLock, LockError, Result, RetryPolicy, keys, store::LockStore};

/// Acquires a set of locks in a canonical order, all or nothing.
///
/// Resource ids are sorted ascending and de-duplicated at construction, so
/// any two batches touching overlapping ids request the shared locks in the
/// same order and cannot deadlock against each other.
#[derive(Debug)]
pub struct BatchLockManager<L> {
    locks: Vec<DistributedLock<L>>,
    held: usize,
}

impl<L: LockStore + Clone> BatchLockManager<L> {
    /// Builds a batch over arbitrary ids, using `key_fn` to name each lock.
    pub fn new<T, F>(store: L, ids: impl IntoIterator<Item = T>, ttl: Duration, key_fn: F) -> Self
    where
        T: Ord,
        F: Fn(&T) -> String,
    {
        let mut ids: Vec<T> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        let locks = ids
            .iter()
            .map(|id| DistributedLock::new(store.clone(), key_fn(id), ttl))
            .collect();

        Self { locks, held: 0 }
    }

    /// Builds a batch over inventory locks for the given goods.
    pub fn for_goods(
        store: L,
        goods_ids: impl IntoIterator<Item = GoodsId>,
        ttl: Duration,
    ) -> Self {
        Self::new(store, goods_ids, ttl, |id| keys::inventory(*id))
    }

    /// Returns the lock keys in acquisition order.
    pub fn keys(&self) -> Vec<&str> {
        self.locks.iter().map(|l| l.key()).collect()
    }

    /// Returns true while every lock in the batch is held.
    pub fn is_locked(&self) -> bool {
        !self.locks.is_empty() && self.held == self.locks.len()
    }

    /// Acquires every lock in sorted order.
    ///
    /// On the first lock that stays busy (or fails), everything acquired so
    /// far is released before the error is returned.
    #[tracing::instrument(skip(self), fields(locks = self.locks.len()))]
    pub async fn lock_all(&mut self, policy: RetryPolicy) -> Result<()> {
        while self.held < self.locks.len() {
            let lock = &self.locks[self.held];
            match lock.try_acquire(policy).await {
                Ok(true) => {
                    tracing::debug!(key = lock.key(), "batch lock acquired");
                    self.held += 1;
                }
                Ok(false) => {
                    let key = lock.key().to_string();
                    self.unlock_all().await;
                    return Err(LockError::Busy {
                        key,
                        attempts: policy.attempts.max(1),
                    });
                }
                Err(e) => {
                    self.unlock_all().await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Releases every held lock. Individual failures are logged, never
    /// returned.
    pub async fn unlock_all(&mut self) {
        for lock in self.locks[..self.held].iter().rev() {
            match lock.release().await {
                Ok(true) => tracing::debug!(key = lock.key(), "batch lock released"),
                Ok(false) => {}
                Err(e) => tracing::warn!(key = lock.key(), error = %e, "failed to release lock"),
            }
        }
        self.held = 0;
    }
}
