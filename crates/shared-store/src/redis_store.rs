//! # Redis Store
//!
//! Production [`SharedStore`] backed by Redis, shared by every process.
//!
//! - `consume_window` runs as a Lua script so the read-check-increment is a
//!   single atomic round-trip.
//! - Prefix enumeration uses `SCAN MATCH` rather than `KEYS` so large
//!   keyspaces do not block the server.
//! - Connections go through `redis::aio::ConnectionManager`, which
//!   reconnects transparently; a failed command surfaces as
//!   [`StoreError::Unavailable`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::ports::{SharedStore, StoreError, WindowConsumption};

/// Fixed-window consume.
///
/// KEYS[1] = counter key, ARGV[1] = capacity, ARGV[2] = window in ms.
/// Returns `{admitted, remaining, resets_in_ms}`.
const CONSUME_WINDOW_LUA: &str = r"
local capacity = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local used = tonumber(redis.call('GET', KEYS[1]) or '0')
local ttl = redis.call('PTTL', KEYS[1])
if used == 0 or ttl < 0 then
  if capacity < 1 then
    return {0, 0, window_ms}
  end
  redis.call('SET', KEYS[1], 1, 'PX', window_ms)
  return {1, capacity - 1, window_ms}
end
if used < capacity then
  used = redis.call('INCR', KEYS[1])
  return {1, capacity - used, ttl}
end
return {0, 0, ttl}
";

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Redis-backed [`SharedStore`].
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    consume_script: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] if the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        info!(url, "Connected to Redis shared store");

        Ok(Self {
            connection,
            consume_script: Script::new(CONSUME_WINDOW_LUA),
        })
    }
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

/// Expiry in whole milliseconds for `PX`; Redis rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl)).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        Ok(conn.del(keys).await?)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        let mut iter = conn.scan_match::<_, String>(glob_escape(prefix)).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn consume_window(
        &self,
        key: &str,
        capacity: u32,
        window: Duration,
    ) -> Result<WindowConsumption, StoreError> {
        let mut conn = self.connection.clone();
        let window_ms = ttl_millis(window);
        let reply: Vec<i64> = self
            .consume_script
            .key(key)
            .arg(capacity)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        match reply.as_slice() {
            [admitted, remaining, resets_in_ms] => Ok(WindowConsumption {
                admitted: *admitted == 1,
                remaining: u32::try_from(*remaining).unwrap_or(0),
                resets_in: Duration::from_millis(u64::try_from(*resets_in_ms).unwrap_or(0)),
            }),
            other => Err(StoreError::Protocol(format!(
                "consume_window returned {} values",
                other.len()
            ))),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
