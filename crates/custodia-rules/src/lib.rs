//! Rule evaluation and the enforcement decision engine.
//!
//! The evaluator turns a request into a list of violations by running the
//! registered rules for the request's category through a pluggable
//! [`RuleProvider`]. The decision engine then maps the violation set onto a
//! single enforcement action. Evaluation is async and time-bounded; the
//! decision engine is pure.

pub mod decision;
pub mod evaluator;
pub mod provider;
pub mod registry;

pub use decision::{decide, OverridePolicy};
pub use evaluator::RuleEvaluator;
pub use provider::{
    RuleOutcome, RuleProvider, RuleProviderError, StaticBehavior, StaticRuleProvider,
};
pub use registry::RuleRegistry;
