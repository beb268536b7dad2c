//! Redis-backed lock store.
//!
//! Acquire is `SET key token NX PX ttl`; release is a Lua script that
//! deletes the key only when it still holds the caller's token.

use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, Script, aio::ConnectionManager};

use crate::{LockError, Result, store::LockStore};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Lock store backed by a Redis server.
///
/// The connection manager reconnects on its own and is cheap to clone, so
/// one store is shared by every service in the process.
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    release: Script,
}

impl RedisLockStore {
    /// Connects to Redis at the given URL, e.g. `redis://127.0.0.1/`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_manager(conn))
    }

    /// Wraps an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let ttl_ms = u64::try_from(ttl.as_millis())
            .map_err(|_| LockError::Backend(format!("ttl out of range: {ttl:?}")))?;
        if ttl_ms == 0 {
            return Err(LockError::Backend("ttl must be at least 1ms".to_string()));
        }

        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn delete_if_matches(&self, key: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;

        Ok(deleted == 1)
    }
}
