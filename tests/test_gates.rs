//! Gate behavior through the full pipeline: rate limiting and quarantine.

mod common;

use common::{open_store, read_request, start_tiered, temp_db};

use std::time::Duration;

use custodia::{
    EnforcementAction, IdentityKind, PipelineConfig, RateLimitConfig, ReasonCode, ScopeLimit,
};

fn limited_config(per_principal: u32) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.rate_limits = RateLimitConfig {
        enabled: true,
        global: ScopeLimit {
            capacity: 10_000,
            window_secs: 60,
        },
        per_address: ScopeLimit {
            capacity: 10_000,
            window_secs: 60,
        },
        per_principal: ScopeLimit {
            capacity: per_principal,
            window_secs: 60,
        },
    };
    config
}

#[tokio::test]
async fn capacity_requests_pass_and_the_next_is_denied() {
    let db = temp_db();
    let pipeline = start_tiered(limited_config(3), &db);

    for _ in 0..3 {
        let d = pipeline
            .decide(read_request("user-1", "10.0.0.1", "clean"))
            .await
            .unwrap();
        assert_eq!(d.action, EnforcementAction::Allow);
    }

    let denied = pipeline
        .decide(read_request("user-1", "10.0.0.1", "clean"))
        .await
        .unwrap();
    assert_eq!(denied.action, EnforcementAction::Block);
    assert_eq!(denied.reason, ReasonCode::RateLimited);
    let retry_after = denied.retry_after.expect("rate denial without retry_after");
    assert!(retry_after > Duration::ZERO);
    assert!(retry_after <= Duration::from_secs(60));

    // A different principal is unaffected.
    let other = pipeline
        .decide(read_request("user-2", "10.0.0.2", "clean"))
        .await
        .unwrap();
    assert_eq!(other.action, EnforcementAction::Allow);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn rate_denials_are_audited() {
    let db = temp_db();
    let pipeline = start_tiered(limited_config(1), &db);

    pipeline
        .decide(read_request("user-1", "10.0.0.1", "clean"))
        .await
        .unwrap();
    pipeline
        .decide(read_request("user-1", "10.0.0.1", "clean"))
        .await
        .unwrap();
    pipeline.shutdown().await.unwrap();

    let store = open_store(&db);
    let events = store.load_all().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1].metadata["decision_reason"],
        serde_json::json!("RateLimited")
    );
}

#[tokio::test]
async fn rate_limiting_disabled_by_explicit_config() {
    let db = temp_db();
    let mut config = PipelineConfig::default();
    config.rate_limits.enabled = false;
    let pipeline = start_tiered(config, &db);

    for _ in 0..100 {
        let d = pipeline
            .decide(read_request("user-1", "10.0.0.1", "clean"))
            .await
            .unwrap();
        assert_eq!(d.action, EnforcementAction::Allow);
    }
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn high_violation_quarantines_and_denials_follow() {
    let db = temp_db();
    let pipeline = start_tiered(PipelineConfig::default(), &db);

    let first = pipeline
        .decide(read_request("user-1", "10.0.0.1", "high"))
        .await
        .unwrap();
    assert_eq!(first.action, EnforcementAction::Quarantine);

    // Any later request carrying the quarantined address is denied before
    // rule evaluation, whatever its category.
    let denied = pipeline
        .decide(read_request("user-2", "10.0.0.1", "clean"))
        .await
        .unwrap();
    assert_eq!(denied.action, EnforcementAction::Block);
    assert_eq!(denied.reason, ReasonCode::QuarantineActive);
    assert!(!denied.message.contains("rule"));

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn expired_quarantine_no_longer_gates() {
    let db = temp_db();
    let mut config = PipelineConfig::default();
    config.quarantine_ttl_secs = 1;
    config.quarantine_review_secs = 1;
    let pipeline = start_tiered(config, &db);

    pipeline
        .decide(read_request("user-1", "10.0.0.1", "high"))
        .await
        .unwrap();
    let during = pipeline
        .decide(read_request("user-1", "10.0.0.1", "clean"))
        .await
        .unwrap();
    assert_eq!(during.reason, ReasonCode::QuarantineActive);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    // The identical request now proceeds to rule evaluation.
    let after = pipeline
        .decide(read_request("user-1", "10.0.0.1", "clean"))
        .await
        .unwrap();
    assert_eq!(after.action, EnforcementAction::Allow);
    assert_eq!(after.reason, ReasonCode::PolicyOutcome);
    assert_eq!(pipeline.metrics().active_quarantines, 0);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn released_quarantine_restores_access_immediately() {
    let db = temp_db();
    let pipeline = start_tiered(PipelineConfig::default(), &db);

    pipeline
        .decide(read_request("user-1", "10.0.0.1", "high"))
        .await
        .unwrap();
    assert_eq!(pipeline.metrics().active_quarantines, 1);

    assert!(pipeline.quarantine().release(IdentityKind::Address, "10.0.0.1"));

    let after = pipeline
        .decide(read_request("user-1", "10.0.0.1", "clean"))
        .await
        .unwrap();
    assert_eq!(after.action, EnforcementAction::Allow);

    pipeline.shutdown().await.unwrap();
}
