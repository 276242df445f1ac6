//! Example demonstrating Redis-backed stores for distributed admission.
//!
//! Counters, blocks and security events live in Redis, so every instance
//! of a service sees the same quotas and the same block list.
//!
//! # Quick Start
//!
//! 1. Start Redis:
//!    ```bash
//!    docker run -p 6379:6379 redis:7-alpine
//!    ```
//!
//! 2. Run the example (from project root):
//!    ```bash
//!    cargo run --example redis --features redis-storage
//!    ```
//!
//! # Testing Distributed Limits
//!
//! Run the example in two terminals at the same time. Both instances share
//! the `promo_code` quota, so together they admit only ten redemptions.

use gatekeeper::{Actor, Gatekeeper, RedisStorage, RedisStorageConfig, Request};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("gatekeeper=info,redis=info")
        .init();

    let config = RedisStorageConfig {
        key_prefix: "gatekeeper-demo:".to_string(),
        event_retention: Duration::from_secs(60 * 60),
        ..RedisStorageConfig::default()
    };
    let storage =
        Arc::new(RedisStorage::connect_with_config("redis://127.0.0.1:6379", config).await?);

    let gatekeeper = Gatekeeper::builder()
        .with_platform_policies()
        .with_counter_store(storage.clone())
        .with_block_store(storage.clone())
        .with_event_log(storage)
        .build()?;

    info!("Starting Redis-backed gatekeeper example");

    let actor = Actor::from_address("203.0.113.50").with_user("user-42");
    let redeem = Request::new("promo_code", actor, "/api/promo/redeem");

    for i in 1..=15 {
        let decision = gatekeeper.check(&redeem).await;
        info!(
            attempt = i,
            status = decision.status_code(),
            code = decision.error_code().unwrap_or("-"),
            "Promo redemption"
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let snapshot = gatekeeper.metrics().snapshot();
    info!(
        allowed = snapshot.requests_allowed,
        throttled = snapshot.requests_throttled,
        store_failures = snapshot.store_failures,
        "Example complete; run again to see the shared window"
    );

    Ok(())
}
