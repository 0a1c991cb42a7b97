//! The orchestrator: one entry point per request.
//!
//! `decide()` runs the stages in a fixed order: validate, rate limit,
//! quarantine check, rule evaluation, decision engine, quarantine
//! application, audit. Gating denials short-circuit straight to auditing;
//! every decision, including denials, produces an audit event.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use custodia_gate::{IdentityKind, QuarantineStore, RateCheck, RateLimiter};
use custodia_rules::{decide, OverridePolicy, RuleEvaluator, RuleProvider, RuleRegistry};
use custodia_seal::{AuditSink, EventSealer, SealerKeys, SqliteAuditStore};
use custodia_types::{
    ActorIdentity, AuditEvent, CustodiaError, EnforcementAction, EnforcementDecision,
    FailurePolicy, PipelineConfig, RequestContext,
};

use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::worker::{SealFailure, SealWriter, WriterConfig};

/// The compliance pipeline. One instance per audited deployment.
pub struct CompliancePipeline {
    evaluator: RuleEvaluator,
    overrides: OverridePolicy,
    rate_limiter: RateLimiter,
    quarantine: QuarantineStore,
    writer: SealWriter,
    failure_policy: FailurePolicy,
    metrics: Arc<PipelineMetrics>,
}

impl CompliancePipeline {
    /// Start a pipeline backed by a SQLite audit store at `db_path`.
    ///
    /// The sealer resumes from the store's latest hash, so restarting a
    /// pipeline continues the existing chain rather than forking it.
    pub fn start(
        config: PipelineConfig,
        registry: RuleRegistry,
        provider: Arc<dyn RuleProvider>,
        overrides: OverridePolicy,
        db_path: &Path,
    ) -> Result<Self, CustodiaError> {
        let store = SqliteAuditStore::open(db_path)?;
        let chain_tip = store.latest_hash()?;
        Self::start_with_sink(config, registry, provider, overrides, Box::new(store), chain_tip)
    }

    /// Start a pipeline on an arbitrary sink, resuming from `chain_tip`.
    pub fn start_with_sink(
        config: PipelineConfig,
        registry: RuleRegistry,
        provider: Arc<dyn RuleProvider>,
        overrides: OverridePolicy,
        sink: Box<dyn AuditSink>,
        chain_tip: impl Into<String>,
    ) -> Result<Self, CustodiaError> {
        config.validate()?;

        let keys = SealerKeys::from_config(&config)?;
        let sealer = EventSealer::new(keys, chain_tip);
        let metrics = Arc::new(PipelineMetrics::new());
        let writer = SealWriter::start(
            sealer,
            sink,
            WriterConfig {
                queue_capacity: config.queue_capacity,
                batch_size: config.batch_size,
                batch_max_age: Duration::from_secs(config.batch_max_age_secs),
            },
            Arc::clone(&metrics),
        );

        info!(
            failure_policy = ?config.failure_policy,
            rate_limiting = config.rate_limits.enabled,
            "compliance pipeline started"
        );

        Ok(Self {
            evaluator: RuleEvaluator::new(
                registry,
                provider,
                Duration::from_millis(config.rule_timeout_ms),
            ),
            overrides,
            rate_limiter: RateLimiter::new(config.rate_limits.clone()),
            quarantine: QuarantineStore::new(
                config.quarantine_ttl_secs,
                config.quarantine_review_secs,
            ),
            writer,
            failure_policy: config.failure_policy,
            metrics,
        })
    }

    /// Decide one request.
    ///
    /// Returns synchronously once the decision is made and its audit event
    /// is queued; sealing happens in the background. The only `Err` is a
    /// validation failure, which means the request never entered the
    /// pipeline at all.
    pub async fn decide(
        &self,
        ctx: RequestContext,
    ) -> Result<EnforcementDecision, CustodiaError> {
        ctx.validate()?;
        self.metrics.record_processed();

        if let RateCheck::Denied { retry_after } = self.rate_limiter.consume(&ctx.actor) {
            return Ok(self.finish(ctx, EnforcementDecision::rate_limited(retry_after)));
        }

        if let Some(record) = self.quarantine.check(&ctx.actor) {
            warn!(
                kind = %record.kind,
                value = %record.value,
                "request from quarantined identity denied"
            );
            return Ok(self.finish(ctx, EnforcementDecision::quarantine_active()));
        }

        let violations = self.evaluator.evaluate(&ctx).await;
        let decision = decide(&violations, &self.overrides);

        if decision.action == EnforcementAction::Quarantine {
            self.quarantine_actor(&ctx.actor);
        }

        Ok(self.finish(ctx, decision))
    }

    /// Audit the decision and apply the failure policy if auditing is
    /// degraded. Returns the decision the caller must enforce.
    fn finish(&self, ctx: RequestContext, decision: EnforcementDecision) -> EnforcementDecision {
        let event = AuditEvent::from_decision(&ctx, &decision);
        let decision = match self.writer.enqueue(event) {
            Ok(()) => decision,
            Err(e) => {
                self.metrics.record_audit_degraded();
                match self.failure_policy {
                    FailurePolicy::FailSecure => {
                        warn!(error = %e, "audit path degraded, failing secure");
                        EnforcementDecision::audit_degraded()
                    }
                    FailurePolicy::FailOpen => {
                        warn!(error = %e, "audit path degraded, decision stands unaudited");
                        decision
                    }
                }
            }
        };

        if decision.action.is_denial() {
            self.metrics.record_blocked();
        }
        decision
    }

    /// Restrict the highest-priority identity facet present on the actor,
    /// in the same priority order the quarantine check uses.
    fn quarantine_actor(&self, actor: &ActorIdentity) {
        let target = actor
            .address
            .as_ref()
            .map(|v| (IdentityKind::Address, v))
            .or_else(|| actor.principal.as_ref().map(|v| (IdentityKind::Principal, v)))
            .or_else(|| actor.session.as_ref().map(|v| (IdentityKind::Session, v)));

        match target {
            Some((kind, value)) => {
                self.quarantine
                    .apply(kind, value.clone(), "high-severity compliance violation");
            }
            None => {
                // Fully anonymous actors cannot be pinned to an identity;
                // the denial itself still stands and is audited.
                warn!("quarantine action on anonymous actor, no identity to restrict");
            }
        }
    }

    /// Point-in-time pipeline health.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.writer.queue_depth(), self.quarantine.active_count())
    }

    /// Take the receiving end of the seal-failure channel.
    ///
    /// Each failure carries the affected audit event in its `Failed` state.
    /// There is a single consumer; returns `None` once taken.
    pub fn failures(&self) -> Option<mpsc::Receiver<SealFailure>> {
        self.writer.failures()
    }

    /// The quarantine store, for review tooling (release, purge).
    pub fn quarantine(&self) -> &QuarantineStore {
        &self.quarantine
    }

    /// Ask the worker to flush its pending Merkle batch.
    pub async fn flush(&self) -> Result<(), CustodiaError> {
        self.writer.flush().await
    }

    /// Drain the ingestion queue and stop the sealing worker.
    pub async fn shutdown(self) -> Result<(), CustodiaError> {
        self.writer.shutdown().await
    }
}
