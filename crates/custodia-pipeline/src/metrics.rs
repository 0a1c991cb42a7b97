//! Pipeline counters.
//!
//! Plain atomics, incremented on the request path and read by the admin
//! surface. Queue depth and active quarantine counts are sampled at
//! snapshot time rather than tracked here.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Shared counters for one pipeline instance.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    processed: AtomicU64,
    blocked: AtomicU64,
    sealed: AtomicU64,
    seal_failures: AtomicU64,
    audit_degraded: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sealed(&self) {
        self.sealed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_seal_failure(&self) {
        self.seal_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_degraded(&self) {
        self.audit_degraded.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot, combining the counters with externally
    /// sampled gauges.
    pub fn snapshot(&self, queue_depth: usize, active_quarantines: usize) -> MetricsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let blocked = self.blocked.load(Ordering::Relaxed);
        MetricsSnapshot {
            processed,
            blocked,
            sealed: self.sealed.load(Ordering::Relaxed),
            seal_failures: self.seal_failures.load(Ordering::Relaxed),
            audit_degraded: self.audit_degraded.load(Ordering::Relaxed),
            block_rate: if processed == 0 {
                0.0
            } else {
                blocked as f64 / processed as f64
            },
            queue_depth,
            active_quarantines,
        }
    }
}

/// Serializable view of the pipeline's health.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Requests that entered the pipeline.
    pub processed: u64,
    /// Requests that ended in a denial.
    pub blocked: u64,
    /// Events sealed and persisted.
    pub sealed: u64,
    /// Events that failed to seal or persist.
    pub seal_failures: u64,
    /// Requests whose audit event could not be enqueued.
    pub audit_degraded: u64,
    /// blocked / processed, 0.0 when nothing has been processed.
    pub block_rate: f64,
    /// Commands currently waiting in the ingestion queue.
    pub queue_depth: usize,
    /// Unexpired quarantine records.
    pub active_quarantines: usize,
}
