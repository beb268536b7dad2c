//! Distributed mutual exclusion over an external key/value store.
//!
//! A [`DistributedLock`] sets a key to a random token only if the key is
//! absent, and releases it with a compare-and-delete so a holder whose TTL
//! already expired can never delete somebody else's lock.
//! [`BatchLockManager`] takes many such locks in ascending id order, which is
//! the only deadlock-avoidance rule the services rely on.

pub mod batch;
pub mod error;
pub mod keys;
pub mod lock;
pub mod memory;
pub mod redis;
pub mod store;

pub use batch::BatchLockManager;
pub use error::{LockError, Result};
pub use lock::{DistributedLock, RetryPolicy};
pub use memory::InMemoryLockStore;
pub use self::redis::RedisLockStore;
pub use store::LockStore;
