//! Time-bounded rule evaluation.
//!
//! Runs every registered rule for the request's category through the
//! provider, each call bounded by a timeout. Provider errors and timeouts
//! are converted into synthesized CRITICAL violations: if compliance cannot
//! be proven, the request is treated as non-compliant.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, warn};

use custodia_types::{RequestContext, Violation};

use crate::provider::RuleProvider;
use crate::registry::RuleRegistry;

/// Evaluates requests against the registered rules of their category.
pub struct RuleEvaluator {
    registry: RuleRegistry,
    provider: Arc<dyn RuleProvider>,
    rule_timeout: Duration,
}

impl RuleEvaluator {
    pub fn new(
        registry: RuleRegistry,
        provider: Arc<dyn RuleProvider>,
        rule_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            provider,
            rule_timeout,
        }
    }

    /// Evaluate all rules applicable to `ctx`, in registry order.
    ///
    /// Returns one violation per failed rule, plus one synthesized
    /// evaluation-failure violation per provider error or timeout. An empty
    /// vector means the request is fully compliant (or no rules apply).
    pub async fn evaluate(&self, ctx: &RequestContext) -> Vec<Violation> {
        let rules = self.registry.rules_for(&ctx.category);
        if rules.is_empty() {
            debug!(category = %ctx.category, "no rules registered for category");
            return Vec::new();
        }

        let mut violations = Vec::new();
        for rule_id in rules {
            match timeout(self.rule_timeout, self.provider.evaluate_rule(rule_id, ctx)).await {
                Ok(Ok(outcome)) if outcome.compliant => {}
                Ok(Ok(outcome)) => {
                    debug!(rule_id = %rule_id, severity = %outcome.severity, "rule violated");
                    violations.push(Violation::rule(
                        rule_id,
                        &ctx.category,
                        outcome.severity,
                        outcome.message,
                    ));
                }
                Ok(Err(e)) => {
                    error!(rule_id = %rule_id, error = %e, "rule provider failed");
                    violations.push(Violation::evaluation_failure(
                        rule_id,
                        &ctx.category,
                        format!("provider error: {e}"),
                    ));
                }
                Err(_) => {
                    warn!(
                        rule_id = %rule_id,
                        timeout_ms = self.rule_timeout.as_millis() as u64,
                        "rule evaluation timed out"
                    );
                    violations.push(Violation::evaluation_failure(
                        rule_id,
                        &ctx.category,
                        format!(
                            "evaluation timed out after {}ms",
                            self.rule_timeout.as_millis()
                        ),
                    ));
                }
            }
        }
        violations
    }
}
