//! Redis-backed stores.
//!
//! Shares counters, blocks and security events across any number of
//! gatekeeper processes.
//!
//! ## Key layout
//!
//! With the default prefix `gatekeeper:`:
//! - `gatekeeper:counter:{key}`: integer, expiry set by the first increment
//! - `gatekeeper:block:{actor}`: bincode [`BlockEntry`], `SET ... PX duration`
//! - `gatekeeper:events:{actor}`: sorted set of bincode events scored by
//!   timestamp, trimmed to the newest `max_events_per_actor` and expired
//!   after `event_retention` of inactivity
//!
//! ## Atomicity
//!
//! Increments run as a single Lua script (`INCR`, `PEXPIRE` on the first hit,
//! `PTTL`), so concurrent requests from different processes never lose an
//! update and never move an existing window's expiry. A key that somehow
//! lost its TTL gets it back on the next increment.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatekeeper::{Gatekeeper, RedisStorage, RedisStorageConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(
//!         RedisStorage::connect("redis://127.0.0.1/")
//!             .await
//!             .expect("Failed to connect to Redis"),
//!     );
//!
//!     let gatekeeper = Gatekeeper::builder()
//!         .with_platform_policies()
//!         .with_counter_store(storage.clone())
//!         .with_block_store(storage.clone())
//!         .with_event_log(storage)
//!         .build()
//!         .unwrap();
//! }
//! ```

use crate::application::ports::{
    BlockEntry, BlockStore, CounterSnapshot, CounterStore, EventLog, StoreError, MAX_TTL,
};
use crate::domain::event::{SecurityEvent, Severity};
use ahash::RandomState;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Configuration for Redis storage.
#[derive(Debug, Clone)]
pub struct RedisStorageConfig {
    /// Prefix for every key (default: "gatekeeper:")
    pub key_prefix: String,
    /// Idle time after which an actor's event set expires (default: 24 hours)
    pub event_retention: Duration,
    /// Events kept per actor, newest first (default: 1000)
    pub max_events_per_actor: usize,
}

impl Default for RedisStorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "gatekeeper:".to_string(),
            event_retention: Duration::from_secs(24 * 60 * 60),
            max_events_per_actor: 1000,
        }
    }
}

/// Sorted-set member. The nonce keeps otherwise identical events distinct.
#[derive(Serialize, Deserialize)]
struct StoredEvent {
    nonce: u64,
    event: SecurityEvent,
}

/// Counter, block and event storage in Redis.
///
/// Implements all three store ports; share one instance behind an `Arc`.
#[derive(Clone)]
pub struct RedisStorage {
    connection: ConnectionManager,
    config: RedisStorageConfig,
    increment: Arc<Script>,
    nonce_seed: u64,
    sequence: Arc<AtomicU64>,
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStorage {
    /// Connect to Redis with default configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStorageConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStorageConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            config,
            increment: Arc::new(Script::new(INCREMENT_SCRIPT)),
            nonce_seed: RandomState::new().hash_one(std::process::id()),
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &RedisStorageConfig {
        &self.config
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}counter:{}", self.config.key_prefix, key)
    }

    fn block_key(&self, actor_key: &str) -> String {
        format!("{}block:{}", self.config.key_prefix, actor_key)
    }

    fn events_key(&self, actor_key: &str) -> String {
        format!("{}events:{}", self.config.key_prefix, actor_key)
    }

    fn next_nonce(&self) -> u64 {
        self.nonce_seed ^ self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

fn millis(d: Duration) -> u64 {
    (d.min(MAX_TTL).as_millis() as u64).max(1)
}

#[async_trait]
impl CounterStore for RedisStorage {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        let mut conn = self.connection.clone();
        let (count, ttl_ms): (i64, i64) = self
            .increment
            .key(self.counter_key(key))
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await?;

        Ok(CounterSnapshot::new(
            count.max(0) as u64,
            Duration::from_millis(ttl_ms.max(0) as u64),
        ))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.del(self.counter_key(key)).await?;
        Ok(())
    }
}

#[async_trait]
impl BlockStore for RedisStorage {
    async fn set_block(
        &self,
        actor_key: &str,
        duration: Duration,
        reason: &str,
        severity: Severity,
    ) -> Result<BlockEntry, StoreError> {
        let created_at_ms = unix_millis();
        let entry = BlockEntry {
            actor_key: actor_key.to_string(),
            reason: reason.to_string(),
            severity,
            created_at_ms,
            expires_at_ms: created_at_ms.saturating_add(millis(duration)),
        };
        let bytes = bincode::serialize(&entry)?;

        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(self.block_key(actor_key))
            .arg(bytes)
            .arg("PX")
            .arg(millis(duration))
            .query_async(&mut conn)
            .await?;
        Ok(entry)
    }

    async fn is_blocked(&self, actor_key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(self.block_key(actor_key)).await?;
        Ok(exists)
    }

    async fn get_block(&self, actor_key: &str) -> Result<Option<BlockEntry>, StoreError> {
        let key = self.block_key(actor_key);
        let mut conn = self.connection.clone();
        let bytes: Option<Vec<u8>> = conn.get(&key).await?;

        match bytes {
            Some(bytes) => match bincode::deserialize::<BlockEntry>(&bytes) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    // Still blocked; only the details are unreadable
                    tracing::warn!(key = %key, error = %e, "Corrupted block entry in Redis");
                    Ok(Some(BlockEntry {
                        actor_key: actor_key.to_string(),
                        reason: String::new(),
                        severity: Severity::default(),
                        created_at_ms: 0,
                        expires_at_ms: 0,
                    }))
                }
            },
            None => Ok(None),
        }
    }

    async fn unblock(&self, actor_key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(self.block_key(actor_key)).await?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl EventLog for RedisStorage {
    async fn append(&self, event: SecurityEvent) -> Result<(), StoreError> {
        let key = self.events_key(&event.actor_key);
        let score = event.timestamp_ms;
        let bytes = bincode::serialize(&StoredEvent {
            nonce: self.next_nonce(),
            event,
        })?;
        let keep = self.config.max_events_per_actor.max(1) as i64;

        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(score)
            .arg(bytes)
            .ignore()
            .cmd("ZREMRANGEBYRANK")
            .arg(&key)
            .arg(0)
            .arg(-keep - 1)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&key)
            .arg(millis(self.config.event_retention))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn recent(
        &self,
        actor_key: &str,
        since_ms: u64,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let key = self.events_key(actor_key);
        let mut conn = self.connection.clone();
        let members: Vec<Vec<u8>> = redis::cmd("ZRANGEBYSCORE")
            .arg(&key)
            .arg(since_ms)
            .arg("+inf")
            .query_async(&mut conn)
            .await?;

        let mut events = Vec::with_capacity(members.len());
        for bytes in members {
            match bincode::deserialize::<StoredEvent>(&bytes) {
                Ok(stored) => events.push(stored.event),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping corrupted event in Redis")
                }
            }
        }
        Ok(events)
    }
}
