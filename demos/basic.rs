//! Basic example demonstrating the gatekeeper pipeline with in-memory stores.
//!
//! This example walks through the three guard steps: a fixed-window rate
//! limit, attack-signature blocking and brute-force detection.

use gatekeeper::{Actor, Decision, Gatekeeper, Request};
use std::time::SystemTime;

fn describe(decision: &Decision) -> String {
    match decision {
        Decision::Allow(Some(quota)) => format!("allowed ({} left)", quota.remaining),
        Decision::Allow(None) => "allowed".to_string(),
        other => {
            let body = other
                .error_body(SystemTime::now())
                .map(|b| serde_json::to_string(&b).unwrap_or_default())
                .unwrap_or_default();
            format!("{} {}", other.status_code(), body)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("gatekeeper=info")
        .init();

    let gatekeeper = Gatekeeper::builder().with_platform_policies().build()?;

    println!("=== Rate Limit ===");
    println!("Policy: password_reset allows 3 requests per hour per email and address\n");
    let actor = Actor::from_address("203.0.113.10").with_field("email", "alice@example.com");
    let reset = Request::new("password_reset", actor.clone(), "/api/auth/password-reset");
    for i in 1..=4 {
        let decision = gatekeeper.check(&reset).await;
        println!("request {}: {}", i, describe(&decision));
    }

    println!("\n=== Attack Signature ===");
    let probe = Request::new(
        "global",
        Actor::from_address("198.51.100.23"),
        "/static/../../etc/passwd",
    );
    println!("probe: {}", describe(&gatekeeper.check(&probe).await));
    let follow_up = Request::new("global", Actor::from_address("198.51.100.23"), "/");
    println!("follow-up: {}", describe(&gatekeeper.check(&follow_up).await));

    println!("\n=== Brute Force ===");
    let attacker = Actor::from_address("192.0.2.77");
    for _ in 1..=5 {
        let verdict = gatekeeper.record_auth_failure(&attacker).await;
        println!(
            "failure {}: brute force = {}",
            verdict.failures, verdict.is_brute_force
        );
    }
    let login = Request::new("auth", attacker, "/api/auth/login");
    println!("next login: {}", describe(&gatekeeper.check(&login).await));

    let metrics = gatekeeper.metrics().snapshot();
    println!("\n=== Metrics ===");
    println!("allowed:   {}", metrics.requests_allowed);
    println!("throttled: {}", metrics.requests_throttled);
    println!("blocked:   {}", metrics.requests_blocked);

    Ok(())
}
