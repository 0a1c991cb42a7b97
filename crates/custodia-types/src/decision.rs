//! Enforcement decisions produced by the decision engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::violation::Violation;

/// The canonical enforcement actions, one of which is attached to every
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnforcementAction {
    /// Let the operation through.
    Allow,
    /// Let the operation through but record it prominently.
    LogOnly,
    /// Let the operation through with a user-visible warning.
    Warn,
    /// Redirect the caller (e.g. to a consent or review flow).
    Redirect,
    /// Require the caller to re-authenticate before proceeding.
    RequireAuth,
    /// Require a second authentication factor before proceeding.
    RequireTwoFactor,
    /// Deny and place the identity under time-bounded quarantine.
    Quarantine,
    /// Deny outright.
    Block,
}

impl EnforcementAction {
    /// Enforcement level 0-4, matching the severity that produces this
    /// action by default.
    pub fn level(self) -> u8 {
        match self {
            EnforcementAction::Allow | EnforcementAction::LogOnly => 0,
            EnforcementAction::Warn | EnforcementAction::Redirect => 1,
            EnforcementAction::RequireAuth | EnforcementAction::RequireTwoFactor => 2,
            EnforcementAction::Quarantine => 3,
            EnforcementAction::Block => 4,
        }
    }

    /// Total strictness order used to validate overrides: an override may
    /// only keep or raise strictness, never lower it below the base action.
    pub fn strictness(self) -> u8 {
        match self {
            EnforcementAction::Allow => 0,
            EnforcementAction::LogOnly => 1,
            EnforcementAction::Warn => 2,
            EnforcementAction::Redirect => 3,
            EnforcementAction::RequireAuth => 4,
            EnforcementAction::RequireTwoFactor => 5,
            EnforcementAction::Quarantine => 6,
            EnforcementAction::Block => 7,
        }
    }

    /// Whether the action denies the operation.
    pub fn is_denial(self) -> bool {
        matches!(self, EnforcementAction::Quarantine | EnforcementAction::Block)
    }
}

impl std::fmt::Display for EnforcementAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnforcementAction::Allow => "Allow",
            EnforcementAction::LogOnly => "LogOnly",
            EnforcementAction::Warn => "Warn",
            EnforcementAction::Redirect => "Redirect",
            EnforcementAction::RequireAuth => "RequireAuth",
            EnforcementAction::RequireTwoFactor => "RequireTwoFactor",
            EnforcementAction::Quarantine => "Quarantine",
            EnforcementAction::Block => "Block",
        };
        write!(f, "{s}")
    }
}

/// Machine-readable reason attached to every decision.
///
/// Denials always carry one of these so callers can distinguish a policy
/// outcome from a gating denial without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    /// The decision came from rule evaluation.
    PolicyOutcome,
    /// Denied because a rate-limit scope was exhausted.
    RateLimited,
    /// Denied because an identity on the request is quarantined.
    QuarantineActive,
    /// Denied because the audit path is degraded and policy is fail-secure.
    AuditDegraded,
}

/// The decision for one request: action, level, violations, and a generic
/// user-facing message.
///
/// Messages are fixed per level. Rule identifiers never appear here -- they
/// are embedded only in the sealed audit event, so denials cannot be used to
/// enumerate the ruleset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementDecision {
    /// The action the caller must apply.
    pub action: EnforcementAction,
    /// Numeric level 0-4: the maximum violation severity for policy
    /// outcomes, the action's own level for gating denials.
    pub level: u8,
    /// The violations that produced this decision.
    pub violations: Vec<Violation>,
    /// Severity-appropriate generic message, safe to show to the caller.
    pub message: String,
    /// Why the decision was made.
    pub reason: ReasonCode,
    /// How long to wait before retrying, for rate-limit denials.
    pub retry_after: Option<Duration>,
}

impl EnforcementDecision {
    /// An Allow decision with no violations.
    pub fn allow() -> Self {
        Self {
            action: EnforcementAction::Allow,
            level: 0,
            violations: Vec::new(),
            message: "operation permitted".into(),
            reason: ReasonCode::PolicyOutcome,
            retry_after: None,
        }
    }

    /// A Block decision for an exhausted rate-limit scope.
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            action: EnforcementAction::Block,
            level: EnforcementAction::Block.level(),
            violations: Vec::new(),
            message: "request rate exceeded; retry later".into(),
            reason: ReasonCode::RateLimited,
            retry_after: Some(retry_after),
        }
    }

    /// A Block decision for a request from a quarantined identity.
    pub fn quarantine_active() -> Self {
        Self {
            action: EnforcementAction::Block,
            level: EnforcementAction::Block.level(),
            violations: Vec::new(),
            message: "access temporarily restricted pending review".into(),
            reason: ReasonCode::QuarantineActive,
            retry_after: None,
        }
    }

    /// A fail-secure Block decision for a degraded audit path.
    pub fn audit_degraded() -> Self {
        Self {
            action: EnforcementAction::Block,
            level: EnforcementAction::Block.level(),
            violations: Vec::new(),
            message: "operation cannot be processed at this time".into(),
            reason: ReasonCode::AuditDegraded,
            retry_after: None,
        }
    }
}
