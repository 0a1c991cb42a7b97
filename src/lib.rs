//! Custodia: compliance audit and enforcement pipeline.
//!
//! Tamper-evident audit sealing (hash chain, Merkle batches, payload
//! encryption) combined with a deterministic enforcement decision engine,
//! fronted by a bounded async ingestion queue.
//!
//! This crate is a facade over the workspace members; most code should
//! depend on the individual crates, but the re-exports here give examples
//! and integration tests a single import surface.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use custodia::{
//!     ActorIdentity, CompliancePipeline, OverridePolicy, PipelineConfig, RequestContext,
//!     RuleRegistry, StaticRuleProvider,
//! };
//!
//! # async fn run() -> Result<(), custodia::CustodiaError> {
//! let registry = RuleRegistry::new().with_rule("data-access", "retention-check");
//! let provider = Arc::new(StaticRuleProvider::new().passing("retention-check"));
//! let pipeline = CompliancePipeline::start(
//!     PipelineConfig::default(),
//!     registry,
//!     provider,
//!     OverridePolicy::default(),
//!     Path::new("audit.db"),
//! )?;
//!
//! let ctx = RequestContext::new(
//!     ActorIdentity::anonymous().with_principal("user-1"),
//!     "document/42",
//!     "document.read",
//!     "data-access",
//! );
//! let decision = pipeline.decide(ctx).await?;
//! println!("{}", decision.action);
//! pipeline.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub use custodia_gate::{IdentityKind, QuarantineRecord, QuarantineStore, RateCheck, RateLimiter};
pub use custodia_pipeline::{
    CompliancePipeline, MetricsSnapshot, PipelineMetrics, SealFailure, SealWriter, WriterConfig,
};
pub use custodia_rules::{
    decide, OverridePolicy, RuleEvaluator, RuleOutcome, RuleProvider, RuleProviderError,
    RuleRegistry, StaticBehavior, StaticRuleProvider,
};
pub use custodia_seal::{
    verify_chain, AuditSink, ChainReport, EventSealer, MerkleBatch, SealedEvent, SealerKeys,
    SqliteAuditStore, GENESIS_HASH,
};
pub use custodia_types::{
    ActorIdentity, AuditEvent, CustodiaError, EnforcementAction, EnforcementDecision, EventStatus,
    FailurePolicy, PipelineConfig, RateLimitConfig, ReasonCode, RequestContext, ScopeLimit,
    Severity, Violation, ViolationKind,
};
