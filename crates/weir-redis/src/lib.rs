//! Redis backend for the weir coordination primitives.
//!
//! [`RedisStore`] implements `CoordinationStore` with one Redis command per
//! trait method, so the atomicity the port demands is Redis's own
//! single-command atomicity. No Lua, no MULTI blocks.
//!
//! | Port method      | Redis command                      |
//! |------------------|------------------------------------|
//! | `insert_scored`  | `ZADD key score member`            |
//! | `range_by_score` | `ZRANGEBYSCORE key min max LIMIT`  |
//! | `remove_member`  | `ZREM key member`                  |
//! | `set_if_absent`  | `SET key value NX PX ttl`          |
//! | `delete`         | `DEL key`                          |
//! | `now_ms`         | `TIME`                             |
//!
//! `now_ms` makes the Redis server the single authoritative clock for every
//! producer and consumer attached to it.
//!
//! # Usage
//! ```ignore
//! let store = Arc::new(RedisStore::connect("redis://127.0.0.1:6379").await?);
//! let queue: DelayQueue<String, _> =
//!     DelayQueue::new(store, "emails", QueueConfig::default());
//! ```

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use weir_core::error::StoreError;
use weir_core::ports::CoordinationStore;

/// CoordinationStore over a Redis connection.
///
/// Holds a [`MultiplexedConnection`], which is made to be cloned cheaply;
/// all clones share one TCP connection. Each method clones it, so one
/// `RedisStore` value can serve any number of queues and locks concurrently.
#[derive(Debug, Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to Redis at the given URL
    /// (`redis://[:<password>@]<host>:<port>[/<db>]`).
    ///
    /// Fails fast: the connection is established here, not lazily on the
    /// first operation.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::with_source(format!("invalid redis url: {e}"), e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::with_source(format!("redis connect failed: {e}"), e))?;
        Ok(Self { conn })
    }

    /// Wrap an already-established connection. Useful when the caller
    /// manages connection lifecycle itself.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn map_store_error(err: redis::RedisError, op: &str) -> StoreError {
    StoreError::with_source(format!("redis {op} failed: {err}"), err)
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn insert_scored(
        &self,
        set_key: &str,
        member: &str,
        score_ms: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(set_key, member, score_ms)
            .await
            .map_err(|e| map_store_error(e, "ZADD"))?;
        Ok(())
    }

    async fn range_by_score(
        &self,
        set_key: &str,
        min_ms: u64,
        max_ms: u64,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.zrangebyscore_limit(set_key, min_ms, max_ms, 0, limit as isize)
            .await
            .map_err(|e| map_store_error(e, "ZRANGEBYSCORE"))
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .zrem(set_key, member)
            .await
            .map_err(|e| map_store_error(e, "ZREM"))?;
        Ok(removed == 1)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // NX + PX in one SET keeps the presence check, the write and the
        // TTL atomic. The reply is nil when the key was already held.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_store_error(e, "SET NX PX"))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| map_store_error(e, "DEL"))?;
        Ok(())
    }

    async fn now_ms(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let (secs, micros): (u64, u64) = redis::cmd("TIME")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_store_error(e, "TIME"))?;
        Ok(secs * 1000 + micros / 1000)
    }
}
