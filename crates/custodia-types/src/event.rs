//! Raw audit events, created at decision time and consumed by the sealer.
//!
//! An [`AuditEvent`] records one evaluated operation. It is created by the
//! orchestrator in the `Queued` state; the sealing worker moves it to
//! `Sealed` once it is hash-chained and persisted, or to `Failed` when it
//! is handed to the failure channel instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{ActorIdentity, RequestContext};
use crate::decision::EnforcementDecision;
use crate::severity::Severity;

/// Lifecycle status of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    /// Created and waiting in the ingestion queue.
    Queued,
    /// Hashed, chained, and persisted.
    Sealed,
    /// Sealing failed; surfaced on the pipeline's failure channel.
    Failed,
}

/// One evaluated operation, prior to sealing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Who performed the operation.
    pub actor: ActorIdentity,
    /// The resource operated on.
    pub resource: String,
    /// The operation performed.
    pub action: String,
    /// Rule category of the operation.
    pub category: String,
    /// Maximum violation severity of the decision.
    pub severity: Severity,
    /// Free-form metadata, including the decision and its violations.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Sensitive payload; encrypted by the sealer, never stored plaintext.
    pub sensitive_payload: Option<serde_json::Value>,
    /// Lifecycle status.
    pub status: EventStatus,
}

impl AuditEvent {
    /// Build the audit event for a decided request.
    ///
    /// The decision's action, reason, and full violation list are embedded
    /// in the metadata map so they survive into the sealed record.
    pub fn from_decision(ctx: &RequestContext, decision: &EnforcementDecision) -> Self {
        let mut metadata = ctx.metadata.clone();
        metadata.insert("request_id".into(), serde_json::json!(ctx.id));
        metadata.insert("decision_action".into(), serde_json::json!(decision.action));
        metadata.insert("decision_level".into(), serde_json::json!(decision.level));
        metadata.insert("decision_reason".into(), serde_json::json!(decision.reason));
        metadata.insert(
            "violations".into(),
            serde_json::to_value(&decision.violations).unwrap_or(serde_json::Value::Null),
        );

        let severity = decision
            .violations
            .iter()
            .map(|v| v.severity)
            .max()
            .unwrap_or(Severity::Info);

        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: ctx.actor.clone(),
            resource: ctx.resource.clone(),
            action: ctx.action.clone(),
            category: ctx.category.clone(),
            severity,
            metadata,
            sensitive_payload: ctx.sensitive_payload.clone(),
            status: EventStatus::Queued,
        }
    }
}
