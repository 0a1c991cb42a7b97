//! The rule provider seam.
//!
//! A [`RuleProvider`] knows how to evaluate one rule against one request.
//! Production deployments plug in providers backed by whatever rule source
//! they use; [`StaticRuleProvider`] ships in-crate for tests and local runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use custodia_types::{RequestContext, Severity};

/// Errors a rule provider can report.
///
/// These are provider failures, not rule failures: a rule that evaluates to
/// non-compliant is a successful evaluation.
#[derive(Debug, Error)]
pub enum RuleProviderError {
    #[error("unknown rule: {0}")]
    UnknownRule(String),
    #[error("rule provider unavailable: {0}")]
    Unavailable(String),
    #[error("rule evaluation failed: {0}")]
    Evaluation(String),
}

/// The result of evaluating one rule against one request.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    /// Whether the request complies with the rule.
    pub compliant: bool,
    /// Severity of the violation when non-compliant.
    pub severity: Severity,
    /// Evaluation detail, internal only.
    pub message: String,
}

impl RuleOutcome {
    /// The request passed this rule.
    pub fn compliant() -> Self {
        Self {
            compliant: true,
            severity: Severity::Info,
            message: String::new(),
        }
    }

    /// The request failed this rule.
    pub fn violation(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            compliant: false,
            severity,
            message: message.into(),
        }
    }
}

/// Evaluates a single rule against a request.
///
/// Implementations must be cancel-safe: the evaluator bounds every call
/// with a timeout and drops the future on expiry.
#[async_trait]
pub trait RuleProvider: Send + Sync {
    async fn evaluate_rule(
        &self,
        rule_id: &str,
        ctx: &RequestContext,
    ) -> Result<RuleOutcome, RuleProviderError>;
}

/// What a [`StaticRuleProvider`] does when a given rule is evaluated.
#[derive(Debug, Clone)]
pub enum StaticBehavior {
    /// Always compliant.
    Pass,
    /// Always non-compliant with the given severity.
    Fail(Severity, String),
    /// Always errors, simulating a broken provider.
    Error(String),
    /// Sleeps before passing, for exercising the evaluation timeout.
    Delay(Duration),
}

/// A fixed-table provider for tests and local runs.
///
/// Rules not present in the table report [`RuleProviderError::UnknownRule`].
#[derive(Debug, Default)]
pub struct StaticRuleProvider {
    rules: HashMap<String, StaticBehavior>,
}

impl StaticRuleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>, behavior: StaticBehavior) -> Self {
        self.rules.insert(rule_id.into(), behavior);
        self
    }

    /// Shorthand for a rule that always passes.
    pub fn passing(self, rule_id: impl Into<String>) -> Self {
        self.with_rule(rule_id, StaticBehavior::Pass)
    }

    /// Shorthand for a rule that always fails at the given severity.
    pub fn failing(
        self,
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        self.with_rule(rule_id, StaticBehavior::Fail(severity, message.into()))
    }
}

#[async_trait]
impl RuleProvider for StaticRuleProvider {
    async fn evaluate_rule(
        &self,
        rule_id: &str,
        _ctx: &RequestContext,
    ) -> Result<RuleOutcome, RuleProviderError> {
        match self.rules.get(rule_id) {
            Some(StaticBehavior::Pass) => Ok(RuleOutcome::compliant()),
            Some(StaticBehavior::Fail(severity, message)) => {
                Ok(RuleOutcome::violation(*severity, message.clone()))
            }
            Some(StaticBehavior::Error(message)) => {
                Err(RuleProviderError::Evaluation(message.clone()))
            }
            Some(StaticBehavior::Delay(duration)) => {
                tokio::time::sleep(*duration).await;
                Ok(RuleOutcome::compliant())
            }
            None => Err(RuleProviderError::UnknownRule(rule_id.to_string())),
        }
    }
}
