use async_trait::async_trait;
use gatekeeper::infrastructure::mocks::MockClock;
use gatekeeper::{
    Actor, BlockEntry, BlockReason, BlockStore, Decision, EventDetails, EventLog, Gatekeeper,
    HookError, InMemoryBlockStore, InMemoryCounterStore, InMemoryEventLog, Policy,
    PostDecisionHook, Request, SecurityEventType, Severity, StoreError, MAX_TTL,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Harness {
    gatekeeper: Gatekeeper,
    clock: MockClock,
    counters: Arc<InMemoryCounterStore>,
    events: Arc<InMemoryEventLog>,
}

fn harness(policy: Policy) -> Harness {
    let clock = MockClock::new();
    let shared: Arc<MockClock> = Arc::new(clock.clone());
    let counters = Arc::new(InMemoryCounterStore::new(shared.clone()));
    let events = Arc::new(InMemoryEventLog::new());

    let gatekeeper = Gatekeeper::builder()
        .with_policy(policy)
        .with_clock(shared.clone())
        .with_counter_store(counters.clone())
        .with_block_store(Arc::new(InMemoryBlockStore::new(shared)))
        .with_event_log(events.clone())
        .build()
        .unwrap();

    Harness {
        gatekeeper,
        clock,
        counters,
        events,
    }
}

fn search_policy(max: u32) -> Policy {
    Policy::new("search", max, Duration::from_secs(60)).unwrap()
}

fn search_request(address: &str) -> Request {
    Request::new("search", Actor::from_address(address), "/api/search")
}

#[tokio::test]
async fn test_nth_request_allowed_next_throttled() {
    let h = harness(search_policy(3));
    let request = search_request("10.0.0.1");

    for expected_remaining in [2, 1, 0] {
        match h.gatekeeper.check(&request).await {
            Decision::Allow(Some(quota)) => {
                assert_eq!(quota.limit, 3);
                assert_eq!(quota.remaining, expected_remaining);
            }
            other => panic!("expected allow, got {:?}", other),
        }
    }

    let decision = h.gatekeeper.check(&request).await;
    assert_eq!(decision.status_code(), 429);
    assert_eq!(decision.error_code(), Some("SEARCH_RATE_LIMIT_EXCEEDED"));
    assert_eq!(decision.retry_after_secs(), Some(60));

    match decision {
        Decision::Throttle(t) => {
            assert_eq!(t.policy, "search");
            assert_eq!(t.count, 4);
            assert_eq!(t.limit, 3);
        }
        other => panic!("expected throttle, got {:?}", other),
    }

    let metrics = h.gatekeeper.metrics().snapshot();
    assert_eq!(metrics.requests_allowed, 3);
    assert_eq!(metrics.requests_throttled, 1);
}

#[tokio::test]
async fn test_violation_records_event() {
    let h = harness(search_policy(1).with_severity(Severity::Medium));
    let request = search_request("10.0.0.1");

    h.gatekeeper.check(&request).await;
    assert_eq!(h.events.count("ip:10.0.0.1"), 0);

    h.gatekeeper.check(&request).await;
    let events = h.events.recent("ip:10.0.0.1", 0).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::RateLimitExceeded);
    assert_eq!(events[0].severity, Severity::Medium);
    assert_eq!(events[0].resource.as_deref(), Some("search"));
}

#[tokio::test]
async fn test_window_expiry_restores_quota() {
    let h = harness(search_policy(2));
    let request = search_request("10.0.0.1");

    assert!(h.gatekeeper.check(&request).await.is_allow());
    h.clock.advance(Duration::from_secs(30));
    assert!(h.gatekeeper.check(&request).await.is_allow());
    assert!(h.gatekeeper.check(&request).await.is_throttle());

    // Window started at the first request, not the last
    h.clock.advance(Duration::from_secs(30));
    assert!(h.gatekeeper.check(&request).await.is_allow());
}

#[tokio::test]
async fn test_actors_counted_independently() {
    let h = harness(search_policy(1));

    assert!(h.gatekeeper.check(&search_request("10.0.0.1")).await.is_allow());
    assert!(h.gatekeeper.check(&search_request("10.0.0.1")).await.is_throttle());
    assert!(h.gatekeeper.check(&search_request("10.0.0.2")).await.is_allow());
}

#[tokio::test]
async fn test_blocked_actor_never_touches_counters() {
    let h = harness(search_policy(10));
    h.gatekeeper
        .security()
        .block_ip("ip:10.0.0.1", Duration::from_secs(600), "manual", Severity::High)
        .await
        .unwrap();

    let decision = h.gatekeeper.check(&search_request("10.0.0.1")).await;
    assert_eq!(decision.status_code(), 403);
    assert_eq!(decision.error_code(), Some("IP_BLOCKED"));
    match decision {
        Decision::Block(BlockReason::ActorBlocked { reason, expires_in }) => {
            assert_eq!(reason.as_deref(), Some("manual"));
            assert_eq!(expires_in, Some(Duration::from_secs(600)));
        }
        other => panic!("expected actor block, got {:?}", other),
    }

    assert!(h.counters.is_empty());
    assert_eq!(h.gatekeeper.metrics().requests_blocked(), 1);
}

/// Block store that counts lookups before delegating.
#[derive(Debug)]
struct CountingBlockStore {
    inner: InMemoryBlockStore,
    lookups: AtomicUsize,
}

#[async_trait]
impl BlockStore for CountingBlockStore {
    async fn set_block(
        &self,
        actor_key: &str,
        duration: Duration,
        reason: &str,
        severity: Severity,
    ) -> Result<BlockEntry, StoreError> {
        self.inner.set_block(actor_key, duration, reason, severity).await
    }

    async fn is_blocked(&self, actor_key: &str) -> Result<bool, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.is_blocked(actor_key).await
    }

    async fn get_block(&self, actor_key: &str) -> Result<Option<BlockEntry>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_block(actor_key).await
    }

    async fn unblock(&self, actor_key: &str) -> Result<bool, StoreError> {
        self.inner.unblock(actor_key).await
    }
}

#[tokio::test]
async fn test_block_check_is_one_lookup() {
    let blocks = Arc::new(CountingBlockStore {
        inner: InMemoryBlockStore::default(),
        lookups: AtomicUsize::new(0),
    });
    let gatekeeper = Gatekeeper::builder()
        .with_policy(search_policy(10))
        .with_block_store(blocks.clone())
        .build()
        .unwrap();

    assert!(gatekeeper.check(&search_request("10.0.0.1")).await.is_allow());
    assert_eq!(blocks.lookups.load(Ordering::SeqCst), 1);

    gatekeeper
        .security()
        .block_ip("ip:10.0.0.1", Duration::from_secs(60), "manual", Severity::High)
        .await
        .unwrap();
    let decision = gatekeeper.check(&search_request("10.0.0.1")).await;
    assert_eq!(decision.error_code(), Some("IP_BLOCKED"));
    assert_eq!(blocks.lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unbounded_block_duration_is_clamped() {
    let h = harness(search_policy(10));
    let entry = h
        .gatekeeper
        .security()
        .block_ip("ip:10.0.0.1", Duration::MAX, "manual", Severity::Critical)
        .await
        .unwrap();
    assert_eq!(entry.remaining(entry.created_at_ms), MAX_TTL);

    match h.gatekeeper.check(&search_request("10.0.0.1")).await {
        Decision::Block(BlockReason::ActorBlocked { expires_in, .. }) => {
            assert_eq!(expires_in, Some(MAX_TTL));
        }
        other => panic!("expected actor block, got {:?}", other),
    }
}

#[tokio::test]
async fn test_block_expires() {
    let h = harness(search_policy(10));
    h.gatekeeper
        .security()
        .block_ip("ip:10.0.0.1", Duration::from_secs(60), "manual", Severity::Low)
        .await;

    assert!(h.gatekeeper.check(&search_request("10.0.0.1")).await.is_block());
    h.clock.advance(Duration::from_secs(61));
    assert!(h.gatekeeper.check(&search_request("10.0.0.1")).await.is_allow());
}

#[tokio::test]
async fn test_attack_path_blocks_actor() {
    let h = harness(search_policy(10));
    let attack = Request::new(
        "search",
        Actor::from_address("198.51.100.9"),
        "/api/files/../../etc/passwd",
    );

    let decision = h.gatekeeper.check(&attack).await;
    assert_eq!(decision.status_code(), 403);
    assert_eq!(decision.error_code(), Some("SUSPICIOUS_ACCESS"));
    assert!(h.counters.is_empty());

    let block = h
        .gatekeeper
        .security()
        .block_details("ip:198.51.100.9")
        .await
        .unwrap();
    assert_eq!(block.reason, "suspicious access pattern");
    assert_eq!(
        block.expires_at_ms - block.created_at_ms,
        Duration::from_secs(3600).as_millis() as u64
    );

    let events = h.events.recent("ip:198.51.100.9", 0).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::AttackPathDetected);
    assert_eq!(events[0].severity, Severity::High);
    assert_eq!(
        events[0].metadata.get("path").map(String::as_str),
        Some("/api/files/../../etc/passwd")
    );

    // A clean follow-up request is rejected by the block list
    let decision = h.gatekeeper.check(&search_request("198.51.100.9")).await;
    assert_eq!(decision.error_code(), Some("IP_BLOCKED"));
}

#[tokio::test]
async fn test_suspicious_user_agent_recorded_not_rejected() {
    let h = harness(search_policy(10));
    let request = search_request("10.0.0.5").with_user_agent("sqlmap/1.7.2#stable");

    assert!(h.gatekeeper.check(&request).await.is_allow());

    let events = h.events.recent("ip:10.0.0.5", 0).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::SuspiciousUserAgent);
    assert_eq!(events[0].severity, Severity::Medium);
    assert_eq!(h.counters.len(), 1);
}

#[tokio::test]
async fn test_adaptive_limit_for_suspicious_actor() {
    let h = harness(search_policy(100).adaptive(0.5));
    let request = search_request("10.0.0.7");

    // Three high-severity events: score 15, above the threshold of 10
    for _ in 0..3 {
        h.gatekeeper
            .security()
            .log_security_event(
                SecurityEventType::Custom("probe".to_string()),
                EventDetails::new("ip:10.0.0.7", Severity::High),
            )
            .await;
    }

    for _ in 0..50 {
        assert!(h.gatekeeper.check(&request).await.is_allow());
    }
    match h.gatekeeper.check(&request).await {
        Decision::Throttle(t) => {
            assert_eq!(t.limit, 50);
            assert_eq!(t.count, 51);
        }
        other => panic!("expected throttle, got {:?}", other),
    }

    // A clean actor keeps the full limit
    let clean = search_request("10.0.0.8");
    for _ in 0..51 {
        assert!(h.gatekeeper.check(&clean).await.is_allow());
    }
}

#[tokio::test]
async fn test_suspicion_ages_out_of_lookback() {
    let h = harness(search_policy(4).adaptive(0.5));
    let request = search_request("10.0.0.7");

    for _ in 0..3 {
        h.gatekeeper
            .security()
            .log_security_event(
                SecurityEventType::Custom("probe".to_string()),
                EventDetails::new("ip:10.0.0.7", Severity::High),
            )
            .await;
    }

    assert!(h.gatekeeper.check(&request).await.is_allow());
    assert!(h.gatekeeper.check(&request).await.is_allow());
    assert!(h.gatekeeper.check(&request).await.is_throttle());

    h.clock.advance(Duration::from_secs(61 * 60));
    for _ in 0..4 {
        assert!(h.gatekeeper.check(&request).await.is_allow());
    }
}

#[tokio::test]
async fn test_exempt_address_skips_rate_limit_only() {
    let clock: Arc<MockClock> = Arc::new(MockClock::new());
    let gatekeeper = Gatekeeper::builder()
        .with_policy(search_policy(1))
        .with_clock(clock)
        .with_exempt_addresses(vec!["127.0.0.1".to_string()])
        .build()
        .unwrap();

    for _ in 0..5 {
        let decision = gatekeeper.check(&search_request("127.0.0.1")).await;
        assert_eq!(decision, Decision::Allow(None));
    }

    let attack = Request::new("search", Actor::from_address("127.0.0.1"), "/.env");
    assert!(gatekeeper.check(&attack).await.is_block());
}

#[tokio::test]
async fn test_unbound_operation_allowed_without_default() {
    let h = harness(search_policy(1));
    let request = Request::new("export", Actor::from_address("10.0.0.1"), "/api/export");

    for _ in 0..3 {
        assert_eq!(h.gatekeeper.check(&request).await, Decision::Allow(None));
    }
    assert!(h.counters.is_empty());
}

#[tokio::test]
async fn test_default_policy_covers_unbound_operations() {
    let gatekeeper = Gatekeeper::builder()
        .with_policy(search_policy(1))
        .with_default_policy("search")
        .build()
        .unwrap();
    let request = Request::new("export", Actor::from_address("10.0.0.1"), "/api/export");

    assert!(gatekeeper.check(&request).await.is_allow());
    assert!(gatekeeper.check(&request).await.is_throttle());
}

#[tokio::test]
async fn test_record_success_resets_only_flagged_policies() {
    let clock: Arc<MockClock> = Arc::new(MockClock::new());
    let gatekeeper = Gatekeeper::builder()
        .with_policy(Policy::new("login", 2, Duration::from_secs(900)).unwrap().reset_on_success())
        .with_policy(search_policy(2))
        .with_clock(clock)
        .build()
        .unwrap();
    let actor = Actor::from_address("10.0.0.1");
    let login = Request::new("login", actor.clone(), "/api/auth/login");
    let search = Request::new("search", actor.clone(), "/api/search");

    for _ in 0..2 {
        gatekeeper.check(&login).await;
        gatekeeper.check(&search).await;
    }

    assert!(gatekeeper.record_success("login", &actor).await);
    assert!(!gatekeeper.record_success("search", &actor).await);

    assert!(gatekeeper.check(&login).await.is_allow());
    assert!(gatekeeper.check(&search).await.is_throttle());
}

#[tokio::test]
async fn test_tier_limits() {
    let tiered = Policy::new("tiered", 1, Duration::from_secs(60))
        .unwrap()
        .with_key_strategy(gatekeeper::KeyStrategy::Tier)
        .with_tier_limit("admin", 3);
    let h = harness(tiered);

    let admin = Request::new(
        "tiered",
        Actor::from_address("10.0.0.1").with_user("u1").with_role("admin"),
        "/api/tiered",
    );
    let anon = Request::new("tiered", Actor::from_address("10.0.0.1"), "/api/tiered");

    for _ in 0..3 {
        assert!(h.gatekeeper.check(&admin).await.is_allow());
    }
    assert!(h.gatekeeper.check(&admin).await.is_throttle());

    assert!(h.gatekeeper.check(&anon).await.is_allow());
    assert!(h.gatekeeper.check(&anon).await.is_throttle());
}

struct RecordingHook {
    name: String,
    seen: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl PostDecisionHook for RecordingHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_decision(&self, _request: &Request, decision: &Decision) -> Result<(), HookError> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, decision.status_code()));
        if self.fail {
            return Err(HookError::new("notification service down"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_hooks_run_in_order_and_failures_are_contained() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let gatekeeper = Gatekeeper::builder()
        .with_policy(search_policy(1))
        .with_hook(Arc::new(RecordingHook {
            name: "first".to_string(),
            seen: seen.clone(),
            fail: true,
        }))
        .with_hook(Arc::new(RecordingHook {
            name: "second".to_string(),
            seen: seen.clone(),
            fail: false,
        }))
        .build()
        .unwrap();

    let request = search_request("10.0.0.1");
    assert!(gatekeeper.check(&request).await.is_allow());
    assert!(gatekeeper.check(&request).await.is_throttle());

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["first:200", "second:200", "first:429", "second:429"]
    );
    assert_eq!(gatekeeper.metrics().hook_failures(), 2);
}

#[tokio::test]
async fn test_platform_policies_auth_flow() {
    let events = Arc::new(InMemoryEventLog::new());
    let gatekeeper = Gatekeeper::builder()
        .with_platform_policies()
        .with_event_log(events.clone())
        .build()
        .unwrap();

    let actor = Actor::from_address("10.0.0.1").with_field("email", "Alice@Example.com");
    let request = Request::new("auth", actor, "/api/auth/login");

    for _ in 0..5 {
        assert!(gatekeeper.check(&request).await.is_allow());
    }
    let decision = gatekeeper.check(&request).await;
    assert_eq!(decision.error_code(), Some("AUTH_RATE_LIMIT_EXCEEDED"));

    // Login throttles are recorded at high severity
    let recorded = events.recent("ip:10.0.0.1", 0).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].event_type, SecurityEventType::RateLimitExceeded);
    assert_eq!(recorded[0].severity, Severity::High);
    let verdict = gatekeeper
        .security()
        .detect_suspicious_activity("ip:10.0.0.1", Duration::from_secs(60 * 60))
        .await;
    assert_eq!(verdict.score, Severity::High.weight());

    // Same address, different email: separate bucket
    let other = Request::new(
        "auth",
        Actor::from_address("10.0.0.1").with_field("email", "bob@example.com"),
        "/api/auth/login",
    );
    assert!(gatekeeper.check(&other).await.is_allow());
}
