//! Compliance violations produced by rule evaluation.

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Distinguishes a genuine rule failure from a broken rule engine.
///
/// Operators need to tell "the operation violated rule X" apart from "rule X
/// could not be evaluated"; both are enforced, but they are diagnosed very
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// The rule was evaluated and the operation failed it.
    RuleViolation,
    /// The rule provider errored or timed out; compliance could not be
    /// proven, which is treated as non-compliance.
    EvaluationFailure,
}

/// A single rule outcome flagged against a request.
///
/// Transient: produced per request by the evaluator, consumed by the
/// decision engine, and persisted only inside the resulting audit event's
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Identifier of the rule that produced this violation.
    pub rule_id: String,
    /// How serious the violation is.
    pub severity: Severity,
    /// Human-readable evaluation result. Internal only -- never surfaced in
    /// user-facing denial messages.
    pub message: String,
    /// Rule category the rule belongs to.
    pub category: String,
    /// Whether this is a real violation or an evaluator failure.
    pub kind: ViolationKind,
}

impl Violation {
    /// A genuine rule violation.
    pub fn rule(
        rule_id: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            category: category.into(),
            kind: ViolationKind::RuleViolation,
        }
    }

    /// A synthesized CRITICAL violation for a provider failure or timeout.
    ///
    /// Fail-secure: inability to prove compliance is non-compliance.
    pub fn evaluation_failure(
        rule_id: impl Into<String>,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity: Severity::Critical,
            message: message.into(),
            category: category.into(),
            kind: ViolationKind::EvaluationFailure,
        }
    }
}
