//! Error types shared across all custodia crates.

/// Errors that can occur across the compliance pipeline.
///
/// Each variant corresponds to a different subsystem: context validation,
/// rule evaluation, event sealing, the audit store, the orchestrator, or
/// configuration. Rate-limit and quarantine denials are deliberately *not*
/// errors -- they are normal decision outcomes carried by
/// [`ReasonCode`](crate::decision::ReasonCode).
#[derive(Debug, thiserror::Error)]
pub enum CustodiaError {
    #[error("invalid request context: {0}")]
    Validation(String),

    #[error("rule evaluation failed: {0}")]
    RuleEvaluation(String),

    #[error("event sealing failed: {0}")]
    Sealing(String),

    #[error("audit store error: {0}")]
    Store(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("configuration error: {0}")]
    Config(String),
}
