//! The enforcement decision engine.
//!
//! Pure function from a violation set to an enforcement decision. No clock,
//! no randomness, no I/O: the same violations and policy always produce the
//! same decision.

use serde::{Deserialize, Serialize};

use custodia_types::{EnforcementAction, EnforcementDecision, ReasonCode, Violation};

/// Deployment-level adjustments to the default severity-to-action mapping.
///
/// Overrides may raise strictness or substitute one denial for another;
/// they can never turn a CRITICAL finding into an Allow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverridePolicy {
    /// Require a second factor instead of plain re-authentication at MEDIUM.
    pub two_factor_for_medium: bool,
    /// Quarantine instead of blocking outright, e.g. to route first-time
    /// offenders into review instead of a hard denial.
    pub quarantine_instead_of_block: bool,
}

/// Map a violation set onto a single enforcement action.
///
/// The decision level is the maximum severity across all violations; one
/// critical violation outweighs any number of lower ones. Level 4 maps to
/// Block, 3 to Quarantine, 2 to RequireAuth, 1 to Warn, 0 (or no
/// violations) to Allow, with `policy` overrides applied on top. A level-4
/// decision is always a denial regardless of overrides.
pub fn decide(violations: &[Violation], policy: &OverridePolicy) -> EnforcementDecision {
    let level = violations
        .iter()
        .map(|v| v.severity.level())
        .max()
        .unwrap_or(0);

    let mut action = match level {
        4 => EnforcementAction::Block,
        3 => EnforcementAction::Quarantine,
        2 => EnforcementAction::RequireAuth,
        1 => EnforcementAction::Warn,
        _ => EnforcementAction::Allow,
    };

    if action == EnforcementAction::RequireAuth && policy.two_factor_for_medium {
        action = EnforcementAction::RequireTwoFactor;
    }
    if action == EnforcementAction::Block && policy.quarantine_instead_of_block {
        action = EnforcementAction::Quarantine;
    }
    // A critical finding must end in a denial no matter what overrides say.
    if level == 4 && !action.is_denial() {
        action = EnforcementAction::Block;
    }

    EnforcementDecision {
        action,
        level,
        violations: violations.to_vec(),
        message: message_for(action).to_string(),
        reason: ReasonCode::PolicyOutcome,
        retry_after: None,
    }
}

/// Generic per-action message. Never mentions rule identifiers, so denials
/// cannot be used to enumerate the ruleset.
fn message_for(action: EnforcementAction) -> &'static str {
    match action {
        EnforcementAction::Allow => "operation permitted",
        EnforcementAction::LogOnly => "operation permitted and recorded",
        EnforcementAction::Warn => "operation permitted with advisory warning",
        EnforcementAction::Redirect => "additional review required before proceeding",
        EnforcementAction::RequireAuth => "additional authentication required",
        EnforcementAction::RequireTwoFactor => "second authentication factor required",
        EnforcementAction::Quarantine => "access temporarily restricted pending review",
        EnforcementAction::Block => "operation denied by compliance policy",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_types::Severity;

    fn violation(severity: Severity) -> Violation {
        Violation::rule("rule-x", "privacy", severity, "detail")
    }

    #[test]
    fn no_violations_allows() {
        let d = decide(&[], &OverridePolicy::default());
        assert_eq!(d.action, EnforcementAction::Allow);
        assert_eq!(d.level, 0);
        assert!(d.violations.is_empty());
    }

    #[test]
    fn severity_maps_to_action() {
        let cases = [
            (Severity::Info, EnforcementAction::Allow),
            (Severity::Low, EnforcementAction::Warn),
            (Severity::Medium, EnforcementAction::RequireAuth),
            (Severity::High, EnforcementAction::Quarantine),
            (Severity::Critical, EnforcementAction::Block),
        ];
        for (severity, expected) in cases {
            let d = decide(&[violation(severity)], &OverridePolicy::default());
            assert_eq!(d.action, expected, "severity {severity}");
            assert_eq!(d.level, severity.level());
        }
    }

    #[test]
    fn one_critical_outweighs_many_lows() {
        let violations = vec![
            violation(Severity::Low),
            violation(Severity::Low),
            violation(Severity::Low),
            violation(Severity::Critical),
            violation(Severity::Low),
        ];
        let d = decide(&violations, &OverridePolicy::default());
        assert_eq!(d.action, EnforcementAction::Block);
        assert_eq!(d.level, 4);
        assert_eq!(d.violations.len(), 5);
    }

    #[test]
    fn decision_is_deterministic() {
        let violations = vec![violation(Severity::Medium), violation(Severity::High)];
        let policy = OverridePolicy::default();
        let a = decide(&violations, &policy);
        let b = decide(&violations, &policy);
        assert_eq!(a.action, b.action);
        assert_eq!(a.level, b.level);
        assert_eq!(a.message, b.message);
    }

    #[test]
    fn two_factor_override_raises_medium() {
        let policy = OverridePolicy {
            two_factor_for_medium: true,
            ..Default::default()
        };
        let d = decide(&[violation(Severity::Medium)], &policy);
        assert_eq!(d.action, EnforcementAction::RequireTwoFactor);
        assert!(d.action.strictness() > EnforcementAction::RequireAuth.strictness());
    }

    #[test]
    fn quarantine_substitution_is_still_a_denial() {
        let policy = OverridePolicy {
            quarantine_instead_of_block: true,
            ..Default::default()
        };
        let d = decide(&[violation(Severity::Critical)], &policy);
        assert_eq!(d.action, EnforcementAction::Quarantine);
        assert!(d.action.is_denial());
        assert_eq!(d.level, 4);
    }

    #[test]
    fn critical_never_becomes_allow() {
        for policy in [
            OverridePolicy::default(),
            OverridePolicy {
                two_factor_for_medium: true,
                quarantine_instead_of_block: true,
            },
        ] {
            let d = decide(&[violation(Severity::Critical)], &policy);
            assert!(d.action.is_denial(), "critical downgraded under {policy:?}");
        }
    }

    #[test]
    fn messages_never_leak_rule_ids() {
        let d = decide(&[violation(Severity::Critical)], &OverridePolicy::default());
        assert!(!d.message.contains("rule-x"));
    }

    #[test]
    fn level_is_monotone_in_added_violations() {
        let base = vec![violation(Severity::Low)];
        let mut extended = base.clone();
        extended.push(violation(Severity::High));

        let policy = OverridePolicy::default();
        assert!(decide(&extended, &policy).level >= decide(&base, &policy).level);
    }
}
