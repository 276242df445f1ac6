//! In-process store backends.
//!
//! Sharded DashMaps keyed by string. Each operation touches exactly one key
//! under that key's shard lock, so per-key increments are linearizable
//! without any extra coordination. Suitable for single-instance deployments
//! and tests; use the Redis backend when several processes share limits.

use crate::application::ports::{
    BlockEntry, BlockStore, Clock, CounterSnapshot, CounterStore, EventLog, StoreError, MAX_TTL,
};
use crate::domain::event::{SecurityEvent, Severity};
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

type ShardedMap<V> = DashMap<String, V, ahash::RandomState>;

fn sharded_map<V>() -> ShardedMap<V> {
    DashMap::with_hasher(ahash::RandomState::new())
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    expires_at: Instant,
}

/// Fixed-window counters in a sharded map.
///
/// Expired entries are replaced lazily on the next increment; call
/// [`purge_expired`](Self::purge_expired) periodically to bound memory when
/// keys are not revisited.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    map: ShardedMap<WindowCounter>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: sharded_map(),
            clock,
        }
    }

    /// Current count and remaining TTL for `key`, if its window is live.
    pub fn peek(&self, key: &str) -> Option<(u64, Duration)> {
        let now = self.clock.now();
        self.map
            .get(key)
            .filter(|c| c.expires_at > now)
            .map(|c| (c.count, c.expires_at - now))
    }

    /// Drop every expired window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.map.len();
        self.map.retain(|_, c| c.expires_at > now);
        before.saturating_sub(self.map.len())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        let now = self.clock.now();
        let window = window.min(MAX_TTL);
        let mut counter = self.map.entry(key.to_string()).or_insert(WindowCounter {
            count: 0,
            expires_at: now + window,
        });

        if counter.expires_at <= now {
            *counter = WindowCounter {
                count: 0,
                expires_at: now + window,
            };
        }
        counter.count += 1;

        Ok(CounterSnapshot::new(
            counter.count,
            counter.expires_at.saturating_duration_since(now),
        ))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.map.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ActiveBlock {
    entry: BlockEntry,
    expires_at: Instant,
}

/// Auto-expiring block list in a sharded map.
#[derive(Debug)]
pub struct InMemoryBlockStore {
    map: ShardedMap<ActiveBlock>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBlockStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: sharded_map(),
            clock,
        }
    }

    fn live(&self, actor_key: &str) -> Option<BlockEntry> {
        let now = self.clock.now();
        let found = self
            .map
            .get(actor_key)
            .map(|b| (b.expires_at > now, b.entry.clone()));

        match found {
            Some((true, entry)) => Some(entry),
            Some((false, _)) => {
                self.map.remove_if(actor_key, |_, b| b.expires_at <= now);
                None
            }
            None => None,
        }
    }

    /// Drop every expired block. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.map.len();
        self.map.retain(|_, b| b.expires_at > now);
        before.saturating_sub(self.map.len())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn set_block(
        &self,
        actor_key: &str,
        duration: Duration,
        reason: &str,
        severity: Severity,
    ) -> Result<BlockEntry, StoreError> {
        let duration = duration.min(MAX_TTL);
        let created_at_ms = self.clock.unix_millis();
        let entry = BlockEntry {
            actor_key: actor_key.to_string(),
            reason: reason.to_string(),
            severity,
            created_at_ms,
            expires_at_ms: created_at_ms.saturating_add(duration.as_millis() as u64),
        };

        self.map.insert(
            actor_key.to_string(),
            ActiveBlock {
                entry: entry.clone(),
                expires_at: self.clock.now() + duration,
            },
        );
        Ok(entry)
    }

    async fn is_blocked(&self, actor_key: &str) -> Result<bool, StoreError> {
        Ok(self.live(actor_key).is_some())
    }

    async fn get_block(&self, actor_key: &str) -> Result<Option<BlockEntry>, StoreError> {
        Ok(self.live(actor_key))
    }

    async fn unblock(&self, actor_key: &str) -> Result<bool, StoreError> {
        Ok(self.map.remove(actor_key).is_some())
    }
}

/// Default cap on events kept per actor.
pub const DEFAULT_MAX_EVENTS_PER_ACTOR: usize = 1000;

/// Per-actor ring of recent events in a sharded map.
///
/// Each actor keeps at most `max_events_per_actor` events; the oldest are
/// dropped first.
#[derive(Debug)]
pub struct InMemoryEventLog {
    map: ShardedMap<VecDeque<SecurityEvent>>,
    max_events_per_actor: usize,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS_PER_ACTOR)
    }

    pub fn with_capacity(max_events_per_actor: usize) -> Self {
        Self {
            map: sharded_map(),
            max_events_per_actor: max_events_per_actor.max(1),
        }
    }

    /// Drop events older than `cutoff_ms` and actors left with none.
    pub fn prune_before(&self, cutoff_ms: u64) {
        self.map.retain(|_, events| {
            while events.front().is_some_and(|e| e.timestamp_ms < cutoff_ms) {
                events.pop_front();
            }
            !events.is_empty()
        });
    }

    /// Number of events held for `actor_key`.
    pub fn count(&self, actor_key: &str) -> usize {
        self.map.get(actor_key).map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: SecurityEvent) -> Result<(), StoreError> {
        let mut events = self.map.entry(event.actor_key.clone()).or_default();
        events.push_back(event);
        while events.len() > self.max_events_per_actor {
            events.pop_front();
        }
        Ok(())
    }

    async fn recent(
        &self,
        actor_key: &str,
        since_ms: u64,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let events = match self.map.get(actor_key) {
            Some(events) => events
                .iter()
                .filter(|e| e.timestamp_ms >= since_ms)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::SecurityEventType;
    use crate::infrastructure::mocks::MockClock;

    #[tokio::test]
    async fn test_counter_window_is_fixed() {
        let clock = Arc::new(MockClock::new());
        let store = InMemoryCounterStore::new(clock.clone());
        let window = Duration::from_secs(60);

        let first = store.increment("k", window).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.ttl_remaining, window);

        clock.advance(Duration::from_secs(20));
        let second = store.increment("k", window).await.unwrap();
        assert_eq!(second.count, 2);
        // Later increments never push the expiry out
        assert_eq!(second.ttl_remaining, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_counter_expiry_starts_fresh_window() {
        let clock = Arc::new(MockClock::new());
        let store = InMemoryCounterStore::new(clock.clone());
        let window = Duration::from_secs(60);

        for _ in 0..5 {
            store.increment("k", window).await.unwrap();
        }
        clock.advance(Duration::from_secs(60));

        let snapshot = store.increment("k", window).await.unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.ttl_remaining, window);
    }

    #[tokio::test]
    async fn test_counter_reset_and_purge() {
        let clock = Arc::new(MockClock::new());
        let store = InMemoryCounterStore::new(clock.clone());

        store.increment("a", Duration::from_secs(10)).await.unwrap();
        store.increment("b", Duration::from_secs(100)).await.unwrap();
        store.reset("a").await.unwrap();
        assert_eq!(store.peek("a"), None);

        store.increment("c", Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(11));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.peek("b").map(|(count, _)| count), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_exact() {
        let store = Arc::new(InMemoryCounterStore::default());
        let mut tasks = tokio::task::JoinSet::new();

        for _ in 0..200 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                store
                    .increment("shared", Duration::from_secs(60))
                    .await
                    .unwrap()
                    .count
            });
        }

        let mut seen = Vec::new();
        while let Some(count) = tasks.join_next().await {
            seen.push(count.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=200).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_block_expiry() {
        let clock = Arc::new(MockClock::new());
        let store = InMemoryBlockStore::new(clock.clone());

        let entry = store
            .set_block("ip:1.2.3.4", Duration::from_secs(30), "attack", Severity::High)
            .await
            .unwrap();
        assert_eq!(entry.expires_at_ms - entry.created_at_ms, 30_000);
        assert!(store.is_blocked("ip:1.2.3.4").await.unwrap());

        clock.advance(Duration::from_secs(30));
        assert!(!store.is_blocked("ip:1.2.3.4").await.unwrap());
        assert!(store.get_block("ip:1.2.3.4").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_durations_are_clamped() {
        let clock = Arc::new(MockClock::new());
        let blocks = InMemoryBlockStore::new(clock.clone());

        let entry = blocks
            .set_block("ip:1.2.3.4", Duration::MAX, "forever", Severity::Critical)
            .await
            .unwrap();
        assert_eq!(
            entry.expires_at_ms - entry.created_at_ms,
            MAX_TTL.as_millis() as u64
        );
        assert!(blocks.is_blocked("ip:1.2.3.4").await.unwrap());

        let counters = InMemoryCounterStore::new(clock);
        let snapshot = counters.increment("k", Duration::MAX).await.unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.ttl_remaining, MAX_TTL);
    }

    #[tokio::test]
    async fn test_reblock_replaces_entry() {
        let clock = Arc::new(MockClock::new());
        let store = InMemoryBlockStore::new(clock.clone());

        store
            .set_block("ip:1.2.3.4", Duration::from_secs(10), "first", Severity::Low)
            .await
            .unwrap();
        store
            .set_block("ip:1.2.3.4", Duration::from_secs(60), "second", Severity::High)
            .await
            .unwrap();

        clock.advance(Duration::from_secs(20));
        let entry = store.get_block("ip:1.2.3.4").await.unwrap().unwrap();
        assert_eq!(entry.reason, "second");
    }

    #[tokio::test]
    async fn test_event_log_caps_per_actor() {
        let log = InMemoryEventLog::with_capacity(3);
        for ts in 0..5 {
            let event = SecurityEvent::new(SecurityEventType::AuthFailure, "a", Severity::Low, ts);
            log.append(event).await.unwrap();
        }

        let events = log.recent("a", 0).await.unwrap();
        let stamps: Vec<u64> = events.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_event_log_prune() {
        let log = InMemoryEventLog::new();
        for (actor, ts) in [("a", 10), ("a", 20), ("b", 5)] {
            let event = SecurityEvent::new(SecurityEventType::AuthFailure, actor, Severity::Low, ts);
            log.append(event).await.unwrap();
        }

        log.prune_before(15);
        assert_eq!(log.count("a"), 1);
        assert_eq!(log.count("b"), 0);
    }
}
