//! In-memory quarantine store.
//!
//! A quarantine record blocks an identity until its hard expiry passes or a
//! review releases it. Records are authoritative only while unexpired:
//! every read checks expiry itself, so correctness never depends on the
//! periodic reaper having run.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use custodia_types::ActorIdentity;

/// Which identity facet a quarantine record targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    Address,
    Principal,
    Session,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKind::Address => write!(f, "address"),
            IdentityKind::Principal => write!(f, "principal"),
            IdentityKind::Session => write!(f, "session"),
        }
    }
}

/// An active quarantine on one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub kind: IdentityKind,
    pub value: String,
    /// Why the identity was quarantined.
    pub reason: String,
    pub applied_at: DateTime<Utc>,
    /// When a human review is due.
    pub review_deadline: DateTime<Utc>,
    /// Hard expiry. The record is void after this instant, reviewed or not.
    pub expires_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lock-guarded map of active quarantines, keyed by (kind, value).
pub struct QuarantineStore {
    ttl: Duration,
    review_after: Duration,
    records: Mutex<HashMap<(IdentityKind, String), QuarantineRecord>>,
}

impl QuarantineStore {
    /// `ttl_secs` is the hard expiry, `review_secs` the review deadline,
    /// both measured from when a record is applied.
    pub fn new(ttl_secs: u64, review_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            review_after: Duration::seconds(review_secs as i64),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an active quarantine covering any facet of `actor`.
    ///
    /// Checks address, then principal, then session, short-circuiting on the
    /// first hit. Expired records encountered on the way are dropped.
    pub fn check(&self, actor: &ActorIdentity) -> Option<QuarantineRecord> {
        let now = Utc::now();
        let mut records = self.records.lock().expect("quarantine lock poisoned");

        let facets = [
            (IdentityKind::Address, actor.address.as_ref()),
            (IdentityKind::Principal, actor.principal.as_ref()),
            (IdentityKind::Session, actor.session.as_ref()),
        ];
        for (kind, value) in facets {
            let Some(value) = value else { continue };
            let key = (kind, value.clone());
            match records.get(&key) {
                Some(record) if record.is_expired(now) => {
                    records.remove(&key);
                }
                Some(record) => return Some(record.clone()),
                None => {}
            }
        }
        None
    }

    /// Quarantine an identity. Idempotent: re-applying refreshes the
    /// deadlines from now rather than stacking a second record.
    pub fn apply(
        &self,
        kind: IdentityKind,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> QuarantineRecord {
        let value = value.into();
        let now = Utc::now();
        let record = QuarantineRecord {
            kind,
            value: value.clone(),
            reason: reason.into(),
            applied_at: now,
            review_deadline: now + self.review_after,
            expires_at: now + self.ttl,
        };
        info!(kind = %kind, value = %value, expires_at = %record.expires_at, "quarantine applied");
        self.records
            .lock()
            .expect("quarantine lock poisoned")
            .insert((kind, value), record.clone());
        record
    }

    /// Lift a quarantine after review. Returns false if no record existed.
    pub fn release(&self, kind: IdentityKind, value: &str) -> bool {
        let removed = self
            .records
            .lock()
            .expect("quarantine lock poisoned")
            .remove(&(kind, value.to_string()))
            .is_some();
        if removed {
            info!(kind = %kind, value = %value, "quarantine released");
        }
        removed
    }

    /// Drop all expired records. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.lock().expect("quarantine lock poisoned");
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        before - records.len()
    }

    /// Number of currently active (unexpired) quarantines.
    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        self.records
            .lock()
            .expect("quarantine lock poisoned")
            .values()
            .filter(|record| !record.is_expired(now))
            .count()
    }
}
