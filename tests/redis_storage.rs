//! Integration tests for Redis storage.
//!
//! These tests require a Redis instance running at `redis://127.0.0.1/`.
//! Tests are ignored by default - run with `cargo test --features redis-storage --test redis_storage -- --ignored`

#![cfg(feature = "redis-storage")]

use gatekeeper::{
    Actor, BlockStore, CounterStore, EventLog, Gatekeeper, Policy, RedisStorage,
    RedisStorageConfig, Request, SecurityEvent, SecurityEventType, Severity,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinSet;

/// Check if Redis is available before running tests
async fn redis_available() -> bool {
    RedisStorage::connect("redis://127.0.0.1/").await.is_ok()
}

/// Create a test storage with a prefix unique to this test and run
async fn create_test_storage(test_name: &str) -> RedisStorage {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let config = RedisStorageConfig {
        key_prefix: format!("test:{}:{}:", test_name, nanos),
        ..RedisStorageConfig::default()
    };

    RedisStorage::connect_with_config("redis://127.0.0.1/", config)
        .await
        .expect("Failed to connect to Redis")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_counter_window() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available at redis://127.0.0.1/");
        return;
    }

    let storage = create_test_storage("counter_window").await;
    let window = Duration::from_secs(60);

    let first = storage.increment("k", window).await.unwrap();
    assert_eq!(first.count, 1);
    assert!(first.ttl_remaining <= window);
    assert!(first.ttl_remaining > Duration::from_secs(55));

    let second = storage.increment("k", window).await.unwrap();
    assert_eq!(second.count, 2);
    assert!(second.ttl_remaining <= first.ttl_remaining);

    storage.reset("k").await.unwrap();
    assert_eq!(storage.increment("k", window).await.unwrap().count, 1);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_counter_expires() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let storage = create_test_storage("counter_expires").await;
    let window = Duration::from_millis(200);

    storage.increment("k", window).await.unwrap();
    storage.increment("k", window).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(storage.increment("k", window).await.unwrap().count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires Redis
async fn test_redis_concurrent_increments() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let storage = Arc::new(create_test_storage("concurrent").await);
    let mut tasks = JoinSet::new();
    for _ in 0..100 {
        let storage = Arc::clone(&storage);
        tasks.spawn(async move {
            storage
                .increment("shared", Duration::from_secs(60))
                .await
                .unwrap()
                .count
        });
    }

    let mut counts = Vec::new();
    while let Some(result) = tasks.join_next().await {
        counts.push(result.unwrap());
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=100).collect::<Vec<u64>>());
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_block_lifecycle() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let storage = create_test_storage("blocks").await;
    assert!(!storage.is_blocked("ip:1.2.3.4").await.unwrap());

    let entry = storage
        .set_block("ip:1.2.3.4", Duration::from_secs(60), "manual", Severity::High)
        .await
        .unwrap();
    assert_eq!(entry.expires_at_ms - entry.created_at_ms, 60_000);

    assert!(storage.is_blocked("ip:1.2.3.4").await.unwrap());
    let stored = storage.get_block("ip:1.2.3.4").await.unwrap().unwrap();
    assert_eq!(stored, entry);

    assert!(storage.unblock("ip:1.2.3.4").await.unwrap());
    assert!(!storage.unblock("ip:1.2.3.4").await.unwrap());
    assert!(!storage.is_blocked("ip:1.2.3.4").await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_event_log_lookback_and_cap() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let mut storage = create_test_storage("events").await;
    let config = RedisStorageConfig {
        max_events_per_actor: 3,
        ..storage.config().clone()
    };
    storage = RedisStorage::connect_with_config("redis://127.0.0.1/", config)
        .await
        .unwrap();

    let now = now_ms();
    let old = SecurityEvent::new(
        SecurityEventType::AuthFailure,
        "ip:5.6.7.8",
        Severity::Low,
        now - 10_000,
    );
    storage.append(old).await.unwrap();
    for _ in 0..3 {
        let event =
            SecurityEvent::new(SecurityEventType::AuthFailure, "ip:5.6.7.8", Severity::Low, now);
        storage.append(event).await.unwrap();
    }

    // Identical events are kept apart; the oldest fell off the cap
    let events = storage.recent("ip:5.6.7.8", 0).await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.timestamp_ms == now));

    let none = storage.recent("ip:5.6.7.8", now + 1).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_backed_gatekeeper() {
    if !redis_available().await {
        eprintln!("Skipping test: Redis not available");
        return;
    }

    let storage = Arc::new(create_test_storage("gatekeeper").await);
    let build = || {
        Gatekeeper::builder()
            .with_policy(Policy::new("search", 3, Duration::from_secs(60)).unwrap())
            .with_counter_store(storage.clone())
            .with_block_store(storage.clone())
            .with_event_log(storage.clone())
            .build()
            .unwrap()
    };

    // Two instances share one quota
    let first = build();
    let second = build();
    let request = Request::new("search", Actor::from_address("10.1.1.1"), "/api/search");

    assert!(first.check(&request).await.is_allow());
    assert!(second.check(&request).await.is_allow());
    assert!(first.check(&request).await.is_allow());
    assert!(second.check(&request).await.is_throttle());

    // A block imposed through one instance is enforced by the other
    let attack = Request::new("search", Actor::from_address("10.1.1.2"), "/.git/config");
    assert!(first.check(&attack).await.is_block());
    let clean = Request::new("search", Actor::from_address("10.1.1.2"), "/api/search");
    assert_eq!(second.check(&clean).await.error_code(), Some("IP_BLOCKED"));
}
