//! Background sealing worker with a bounded ingestion queue.
//!
//! [`SealWriter`] decouples request handling from the synchronous SQLite
//! writes: audit events are queued over a bounded channel and a background
//! task seals and persists them in arrival order, flushing Merkle batches
//! by size or age.
//!
//! Queue behavior:
//!
//! - The channel is bounded; when full, [`SealWriter::enqueue`] returns an
//!   error instead of blocking, so a saturated audit path is a visible
//!   signal rather than a silent drop.
//! - The `Shutdown` command drains every remaining event before the task
//!   exits, so no queued audit data is lost.
//! - Individual seal or insert failures are counted and each one is
//!   surfaced on the bounded failure channel; the worker keeps going.
//! - Arrival order is sealing order, which is chain order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

use custodia_seal::{AuditSink, EventSealer, MerkleBatch, SealedEvent};
use custodia_types::{AuditEvent, CustodiaError, EventStatus};

use crate::metrics::PipelineMetrics;

/// Commands consumed by the background sealing task.
#[derive(Debug)]
pub enum SealCommand {
    /// Seal and persist one audit event.
    Seal(AuditEvent),
    /// Flush the pending Merkle batch immediately.
    Flush,
    /// Drain everything still queued, then stop.
    Shutdown,
}

/// One failed seal or persist, published on the failure channel.
///
/// Carries the full audit event (in its `Failed` state) so an admin
/// consumer can inspect it or resubmit it once the fault is cleared.
#[derive(Debug, Clone)]
pub struct SealFailure {
    pub event: AuditEvent,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Capacity of the bounded failure channel. Failures beyond this that the
/// consumer has not drained are dropped (they stay logged and counted).
const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Queue and batching parameters for the sealing worker.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Bounded channel capacity.
    pub queue_capacity: usize,
    /// Merkle batch size; a full batch is flushed immediately.
    pub batch_size: usize,
    /// Maximum age of a partial batch before it is flushed anyway.
    pub batch_max_age: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            batch_size: 64,
            batch_max_age: Duration::from_secs(30),
        }
    }
}

/// Handle to the background sealing task.
pub struct SealWriter {
    tx: mpsc::Sender<SealCommand>,
    handle: JoinHandle<()>,
    failure_rx: Mutex<Option<mpsc::Receiver<SealFailure>>>,
    capacity: usize,
}

impl SealWriter {
    /// Spawn the sealing task.
    ///
    /// The worker takes ownership of the sealer and the sink; it is the
    /// chain's single writer.
    pub fn start(
        sealer: EventSealer,
        sink: Box<dyn AuditSink>,
        config: WriterConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (failure_tx, failure_rx) = mpsc::channel(FAILURE_CHANNEL_CAPACITY);
        let capacity = config.queue_capacity;

        info!(
            capacity = config.queue_capacity,
            batch_size = config.batch_size,
            batch_max_age_ms = config.batch_max_age.as_millis() as u64,
            "sealing worker started"
        );

        let handle = tokio::spawn(writer_task(sealer, sink, rx, failure_tx, config, metrics));

        Self {
            tx,
            handle,
            failure_rx: Mutex::new(Some(failure_rx)),
            capacity,
        }
    }

    /// Queue one audit event for sealing.
    ///
    /// Non-blocking. A full queue and a stopped worker produce distinct
    /// errors so the orchestrator can apply its failure policy.
    pub fn enqueue(&self, event: AuditEvent) -> Result<(), CustodiaError> {
        self.tx
            .try_send(SealCommand::Seal(event))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    CustodiaError::Pipeline("ingestion queue full: backpressure applied".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    CustodiaError::Pipeline("ingestion queue closed: sealing worker stopped".into())
                }
            })
    }

    /// Ask the worker to flush its pending Merkle batch.
    pub async fn flush(&self) -> Result<(), CustodiaError> {
        self.tx
            .send(SealCommand::Flush)
            .await
            .map_err(|_| CustodiaError::Pipeline("sealing worker stopped".into()))
    }

    /// Commands currently waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Take the receiving end of the failure channel.
    ///
    /// Failures are delivered once each, in order. There is a single
    /// consumer; after the receiver has been taken this returns `None`.
    pub fn failures(&self) -> Option<mpsc::Receiver<SealFailure>> {
        self.failure_rx
            .lock()
            .expect("failure receiver lock poisoned")
            .take()
    }

    /// Drain everything still queued and stop the worker.
    pub async fn shutdown(self) -> Result<(), CustodiaError> {
        // Awaiting the send (rather than try_send) guarantees the shutdown
        // command is queued even when the channel is momentarily full.
        self.tx
            .send(SealCommand::Shutdown)
            .await
            .map_err(|_| CustodiaError::Pipeline("sealing worker already stopped".into()))?;
        self.handle
            .await
            .map_err(|e| CustodiaError::Pipeline(format!("sealing worker panicked: {e}")))
    }
}

/// The worker's owned state: sealer, sink, and the pending Merkle batch.
struct WriterState {
    sealer: EventSealer,
    sink: Box<dyn AuditSink>,
    pending: Vec<SealedEvent>,
    batch_size: usize,
    failure_tx: mpsc::Sender<SealFailure>,
    metrics: Arc<PipelineMetrics>,
}

impl WriterState {
    /// Seal one event and persist it, keeping the chain cursor consistent
    /// with what the sink actually holds.
    fn seal_one(&mut self, mut event: AuditEvent) {
        let tip_before = self.sealer.chain_tip().to_string();

        let sealed = match self.sealer.seal(&mut event) {
            Ok(sealed) => sealed,
            Err(e) => {
                self.fail_event(event, format!("seal failed: {e}"));
                return;
            }
        };

        if let Err(e) = self.sink.append(&sealed) {
            // The event never reached the store, so the next seal must link
            // to the old tip.
            self.sealer.rewind(tip_before);
            self.fail_event(event, format!("store append failed: {e}"));
            return;
        }

        self.metrics.record_sealed();
        self.pending.push(sealed);
        if self.pending.len() >= self.batch_size {
            self.flush_batch();
        }
    }

    /// Emit a Merkle batch over the pending sealed events.
    fn flush_batch(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = MerkleBatch::from_events(&self.pending);
        let size = batch.size;
        if let Err(e) = self.sink.append_batch(&batch) {
            // The batch is derived data; the chained events themselves are
            // already persisted.
            error!(batch_id = %batch.batch_id, error = %e, "merkle batch insert failed");
        } else {
            trace!(batch_id = %batch.batch_id, size, "merkle batch flushed");
        }
        self.pending.clear();
    }

    /// Mark the event failed and hand it to the failure channel.
    fn fail_event(&self, mut event: AuditEvent, message: String) {
        event.status = EventStatus::Failed;
        error!(event_id = %event.id, error = %message, "audit event lost");
        self.metrics.record_seal_failure();
        let failure = SealFailure {
            event,
            error: message,
            at: Utc::now(),
        };
        // If the consumer has fallen this far behind, the failure is not
        // retained on the channel; it remains logged and counted.
        if self.failure_tx.try_send(failure).is_err() {
            warn!("failure channel full or closed, seal failure not retained");
        }
    }
}

/// Background task: drain the channel, seal in order, batch by size or age.
async fn writer_task(
    sealer: EventSealer,
    sink: Box<dyn AuditSink>,
    mut rx: mpsc::Receiver<SealCommand>,
    failure_tx: mpsc::Sender<SealFailure>,
    config: WriterConfig,
    metrics: Arc<PipelineMetrics>,
) {
    let mut state = WriterState {
        sealer,
        sink,
        pending: Vec::with_capacity(config.batch_size),
        batch_size: config.batch_size,
        failure_tx,
        metrics,
    };

    let mut interval = tokio::time::interval(config.batch_max_age);
    // The first tick completes immediately; consume it so a fresh worker
    // does not flush an empty batch.
    interval.tick().await;

    loop {
        tokio::select! {
            // Bias toward commands so batches fill before the age timer fires.
            biased;

            maybe_cmd = rx.recv() => {
                match maybe_cmd {
                    Some(SealCommand::Seal(event)) => state.seal_one(event),
                    Some(SealCommand::Flush) => state.flush_batch(),
                    Some(SealCommand::Shutdown) => {
                        drain_remaining(&mut state, &mut rx);
                        info!("sealing worker shut down gracefully");
                        return;
                    }
                    None => {
                        state.flush_batch();
                        info!("ingestion queue closed, sealing worker stopped");
                        return;
                    }
                }
            }
            _ = interval.tick() => {
                state.flush_batch();
            }
        }
    }
}

/// After a shutdown signal: close the queue, seal everything buffered, and
/// flush the final batch.
fn drain_remaining(state: &mut WriterState, rx: &mut mpsc::Receiver<SealCommand>) {
    rx.close();
    while let Ok(cmd) = rx.try_recv() {
        match cmd {
            SealCommand::Seal(event) => state.seal_one(event),
            SealCommand::Flush | SealCommand::Shutdown => {}
        }
    }
    state.flush_batch();
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_seal::{SealerKeys, SqliteAuditStore};
    use custodia_types::{ActorIdentity, EnforcementDecision, RequestContext};
    use tempfile::NamedTempFile;

    fn sample_event(principal: &str) -> AuditEvent {
        let ctx = RequestContext::new(
            ActorIdentity::anonymous().with_principal(principal),
            "document/1",
            "document.read",
            "data-access",
        );
        AuditEvent::from_decision(&ctx, &EnforcementDecision::allow())
    }

    fn start_writer(path: &std::path::Path, config: WriterConfig) -> SealWriter {
        let store = SqliteAuditStore::open(path).unwrap();
        let sealer = EventSealer::genesis(SealerKeys::none());
        SealWriter::start(
            sealer,
            Box::new(store),
            config,
            Arc::new(PipelineMetrics::new()),
        )
    }

    #[tokio::test]
    async fn seals_queued_events_in_order() {
        let tmp = NamedTempFile::new().unwrap();
        let writer = start_writer(tmp.path(), WriterConfig::default());

        for i in 0..10 {
            writer.enqueue(sample_event(&format!("user-{i}"))).unwrap();
        }
        writer.shutdown().await.unwrap();

        let store = SqliteAuditStore::open(tmp.path()).unwrap();
        assert_eq!(store.count().unwrap(), 10);
        let report = store.verify_integrity().unwrap();
        assert!(report.valid, "{}", report.message);

        let events = store.load_all().unwrap();
        assert_eq!(events[0].actor.principal.as_deref(), Some("user-0"));
        assert_eq!(events[9].actor.principal.as_deref(), Some("user-9"));
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let tmp = NamedTempFile::new().unwrap();
        let config = WriterConfig {
            queue_capacity: 2,
            batch_size: 1,
            batch_max_age: Duration::from_secs(60),
        };
        let writer = start_writer(tmp.path(), config);

        let mut backpressure_hit = false;
        for i in 0..200 {
            if writer.enqueue(sample_event(&format!("user-{i}"))).is_err() {
                backpressure_hit = true;
                break;
            }
        }
        assert!(backpressure_hit, "expected backpressure on a full queue");
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_everything_queued() {
        let tmp = NamedTempFile::new().unwrap();
        let config = WriterConfig {
            queue_capacity: 4096,
            batch_size: 10_000,
            batch_max_age: Duration::from_secs(600),
        };
        let writer = start_writer(tmp.path(), config);

        for i in 0..200 {
            writer.enqueue(sample_event(&format!("user-{i}"))).unwrap();
        }
        writer.shutdown().await.unwrap();

        let store = SqliteAuditStore::open(tmp.path()).unwrap();
        assert_eq!(store.count().unwrap(), 200);
        assert!(store.verify_integrity().unwrap().valid);
    }

    #[tokio::test]
    async fn merkle_batches_flush_by_size() {
        let tmp = NamedTempFile::new().unwrap();
        let config = WriterConfig {
            queue_capacity: 4096,
            batch_size: 4,
            batch_max_age: Duration::from_secs(600),
        };
        let writer = start_writer(tmp.path(), config);

        for i in 0..9 {
            writer.enqueue(sample_event(&format!("user-{i}"))).unwrap();
        }
        writer.shutdown().await.unwrap();

        // Two full batches of 4, plus the shutdown flush of the last one.
        let store = SqliteAuditStore::open(tmp.path()).unwrap();
        assert_eq!(store.batch_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn merkle_batches_flush_by_age() {
        let tmp = NamedTempFile::new().unwrap();
        let config = WriterConfig {
            queue_capacity: 4096,
            batch_size: 10_000,
            batch_max_age: Duration::from_millis(50),
        };
        let writer = start_writer(tmp.path(), config);

        writer.enqueue(sample_event("user-1")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let store = SqliteAuditStore::open(tmp.path()).unwrap();
        assert!(store.batch_count().unwrap() >= 1, "age flush did not fire");
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn seal_failure_is_published_and_worker_continues() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteAuditStore::open(tmp.path()).unwrap();
        // No encryption key: an event carrying a sensitive payload cannot
        // be sealed.
        let sealer = EventSealer::genesis(SealerKeys::none());
        let metrics = Arc::new(PipelineMetrics::new());
        let writer = SealWriter::start(
            sealer,
            Box::new(store),
            WriterConfig::default(),
            Arc::clone(&metrics),
        );
        let mut failures = writer.failures().expect("receiver already taken");

        let ctx = RequestContext::new(
            ActorIdentity::anonymous().with_principal("user-1"),
            "document/1",
            "document.read",
            "data-access",
        )
        .with_sensitive_payload(serde_json::json!({"client": "secret"}));
        let bad = AuditEvent::from_decision(&ctx, &EnforcementDecision::allow());
        let bad_id = bad.id;

        writer.enqueue(bad).unwrap();
        writer.enqueue(sample_event("survivor")).unwrap();
        writer.shutdown().await.unwrap();

        let failure = failures.recv().await.expect("no failure published");
        assert_eq!(failure.event.id, bad_id);
        assert_eq!(failure.event.status, EventStatus::Failed);

        // The good event was still sealed, linking straight to genesis.
        let store = SqliteAuditStore::open(tmp.path()).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.verify_integrity().unwrap().valid);
        assert_eq!(metrics.snapshot(0, 0).seal_failures, 1);
    }

    #[tokio::test]
    async fn every_seal_failure_is_retained_in_order() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteAuditStore::open(tmp.path()).unwrap();
        // No encryption key, so every payload-carrying event fails to seal.
        let sealer = EventSealer::genesis(SealerKeys::none());
        let writer = SealWriter::start(
            sealer,
            Box::new(store),
            WriterConfig::default(),
            Arc::new(PipelineMetrics::new()),
        );
        let mut failures = writer.failures().expect("receiver already taken");
        assert!(writer.failures().is_none(), "receiver handed out twice");

        let mut expected = Vec::new();
        for i in 0..3 {
            let ctx = RequestContext::new(
                ActorIdentity::anonymous().with_principal(format!("user-{i}")),
                "document/1",
                "document.read",
                "data-access",
            )
            .with_sensitive_payload(serde_json::json!({"n": i}));
            let bad = AuditEvent::from_decision(&ctx, &EnforcementDecision::allow());
            expected.push(bad.id);
            writer.enqueue(bad).unwrap();
        }
        writer.shutdown().await.unwrap();

        let mut seen = Vec::new();
        while let Some(failure) = failures.recv().await {
            seen.push(failure.event.id);
        }
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn queue_depth_tracks_pending_commands() {
        let tmp = NamedTempFile::new().unwrap();
        let config = WriterConfig {
            queue_capacity: 8,
            ..Default::default()
        };
        let writer = start_writer(tmp.path(), config);
        assert_eq!(writer.queue_depth(), 0);
        writer.shutdown().await.unwrap();
    }
}
