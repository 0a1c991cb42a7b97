//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::sync::Arc;

use tempfile::NamedTempFile;

use custodia::{
    ActorIdentity, CompliancePipeline, OverridePolicy, PipelineConfig, RequestContext,
    RuleRegistry, Severity, SqliteAuditStore, StaticRuleProvider,
};

/// Create a temporary file for use as a test audit database.
pub fn temp_db() -> NamedTempFile {
    NamedTempFile::new().expect("should create temp file for audit database")
}

/// Open a read connection on the given temp database.
pub fn open_store(tmp: &NamedTempFile) -> SqliteAuditStore {
    SqliteAuditStore::open(tmp.path()).expect("should open audit store")
}

/// An actor with all three identity facets set.
pub fn full_actor(principal: &str, address: &str) -> ActorIdentity {
    ActorIdentity::anonymous()
        .with_principal(principal)
        .with_address(address)
        .with_session(format!("sess-{principal}"))
}

/// A document-read request in the given category.
pub fn read_request(principal: &str, address: &str, category: &str) -> RequestContext {
    RequestContext::new(
        full_actor(principal, address),
        "document/42",
        "document.read",
        category,
    )
}

/// A provider whose rules cover one category per severity tier:
/// `clean` passes, `low`/`medium`/`high`/`critical` fail at that severity.
pub fn tiered_provider() -> StaticRuleProvider {
    StaticRuleProvider::new()
        .passing("rule-clean")
        .failing("rule-low", Severity::Low, "minor deviation")
        .failing("rule-medium", Severity::Medium, "needs re-authentication")
        .failing("rule-high", Severity::High, "suspicious access pattern")
        .failing("rule-critical", Severity::Critical, "data exfiltration attempt")
}

/// Registry matching [`tiered_provider`], one category per rule.
pub fn tiered_registry() -> RuleRegistry {
    RuleRegistry::new()
        .with_rule("clean", "rule-clean")
        .with_rule("low", "rule-low")
        .with_rule("medium", "rule-medium")
        .with_rule("high", "rule-high")
        .with_rule("critical", "rule-critical")
}

/// Start a pipeline with the tiered rules on the given database.
pub fn start_tiered(config: PipelineConfig, db: &NamedTempFile) -> CompliancePipeline {
    CompliancePipeline::start(
        config,
        tiered_registry(),
        Arc::new(tiered_provider()),
        OverridePolicy::default(),
        db.path(),
    )
    .expect("should start pipeline")
}
