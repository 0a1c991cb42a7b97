//! The compliance pipeline: bounded async ingestion plus the orchestrator
//! that gates, evaluates, decides, and audits every request.
//!
//! [`CompliancePipeline::decide`] is the single entry point: it validates
//! the request, runs the cheap gates (rate limit, quarantine), evaluates the
//! category's rules, maps violations onto an enforcement decision, and hands
//! the resulting audit event to a background sealing worker over a bounded
//! queue. The decision returns synchronously; sealing is asynchronous.

pub mod metrics;
pub mod pipeline;
pub mod worker;

pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::CompliancePipeline;
pub use worker::{SealCommand, SealFailure, SealWriter, WriterConfig};
