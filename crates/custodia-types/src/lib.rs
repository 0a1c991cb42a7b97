//! Core types shared across all custodia crates.
//!
//! Defines request contexts, severities, violations, enforcement decisions,
//! audit events, configuration, and error types used by the sealing ledger,
//! the gating checks, the rule evaluator, and the pipeline orchestrator.

pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod event;
pub mod severity;
pub mod violation;

pub use config::{FailurePolicy, PipelineConfig, RateLimitConfig, ScopeLimit};
pub use context::{ActorIdentity, RequestContext};
pub use decision::{EnforcementAction, EnforcementDecision, ReasonCode};
pub use error::CustodiaError;
pub use event::{AuditEvent, EventStatus};
pub use severity::Severity;
pub use violation::{Violation, ViolationKind};
