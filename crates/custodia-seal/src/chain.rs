//! Pure hash-chain verification.
//!
//! Given a candidate chain segment, recompute every hash in order and check
//! the linkage. Side-effect free, usable in audits and tests without
//! touching a store.

use serde::{Deserialize, Serialize};

use crate::sealed::SealedEvent;

/// The result of verifying a chain segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    /// Total number of events inspected.
    pub total_events: usize,
    /// Whether the entire segment is valid.
    pub valid: bool,
    /// Index of the first event whose hash or chain link is invalid, if any.
    pub first_invalid_event: Option<usize>,
    /// Human-readable summary of the verification result.
    pub message: String,
}

/// Verify a contiguous chain segment against a trusted anchor hash.
///
/// `anchor` is the hash the first event must link to: the genesis sentinel
/// for a full chain, or the preceding event's hash for a mid-chain segment.
/// Checks, per event: (1) `prev_hash` equals the running expectation, and
/// (2) the stored hash matches recomputation from the event's own fields.
pub fn verify_chain(events: &[SealedEvent], anchor: &str) -> ChainReport {
    let total_events = events.len();
    if total_events == 0 {
        return ChainReport {
            total_events: 0,
            valid: true,
            first_invalid_event: None,
            message: "chain segment is empty".into(),
        };
    }

    let mut expected_prev_hash = anchor.to_string();

    for (i, event) in events.iter().enumerate() {
        if event.prev_hash != expected_prev_hash {
            return ChainReport {
                total_events,
                valid: false,
                first_invalid_event: Some(i),
                message: format!(
                    "chain broken at event {i}: expected prev_hash '{expected_prev_hash}', found '{}'",
                    event.prev_hash
                ),
            };
        }

        let recomputed = event.recompute_hash();
        if event.event_hash != recomputed {
            return ChainReport {
                total_events,
                valid: false,
                first_invalid_event: Some(i),
                message: format!(
                    "hash mismatch at event {i}: stored '{}', computed '{recomputed}'",
                    event.event_hash
                ),
            };
        }

        expected_prev_hash = event.event_hash.clone();
    }

    ChainReport {
        total_events,
        valid: true,
        first_invalid_event: None,
        message: format!("all {total_events} events verified successfully"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealed::GENESIS_HASH;
    use crate::sealer::{EventSealer, SealerKeys};
    use custodia_types::{ActorIdentity, AuditEvent, EnforcementDecision, RequestContext};

    fn sealed_run(n: usize) -> Vec<SealedEvent> {
        let mut sealer = EventSealer::genesis(SealerKeys::none());
        (0..n)
            .map(|i| {
                let ctx = RequestContext::new(
                    ActorIdentity::anonymous().with_address(format!("10.0.0.{i}")),
                    format!("matter/{i}"),
                    "matter.view",
                    "case-management",
                );
                let mut event = AuditEvent::from_decision(&ctx, &EnforcementDecision::allow());
                sealer.seal(&mut event).unwrap()
            })
            .collect()
    }

    #[test]
    fn empty_segment_is_valid() {
        let report = verify_chain(&[], GENESIS_HASH);
        assert!(report.valid);
        assert_eq!(report.total_events, 0);
    }

    #[test]
    fn intact_chain_verifies_from_genesis() {
        let events = sealed_run(50);
        let report = verify_chain(&events, GENESIS_HASH);
        assert!(report.valid, "{}", report.message);
        assert_eq!(report.total_events, 50);
        assert!(report.first_invalid_event.is_none());
    }

    #[test]
    fn mutating_one_event_fails_from_that_point() {
        let mut events = sealed_run(10);
        events[4].action = "matter.delete".into();

        let report = verify_chain(&events, GENESIS_HASH);
        assert!(!report.valid);
        assert_eq!(report.first_invalid_event, Some(4));
    }

    #[test]
    fn broken_linkage_detected() {
        let mut events = sealed_run(5);
        events[2].prev_hash = "forged".into();

        let report = verify_chain(&events, GENESIS_HASH);
        assert!(!report.valid);
        assert_eq!(report.first_invalid_event, Some(2));
        assert!(report.message.contains("chain broken"));
    }

    #[test]
    fn mid_chain_segment_verifies_with_anchor() {
        let events = sealed_run(8);
        let anchor = events[2].event_hash.clone();
        let report = verify_chain(&events[3..], &anchor);
        assert!(report.valid, "{}", report.message);
    }

    #[test]
    fn wrong_anchor_fails_first_event() {
        let events = sealed_run(3);
        let report = verify_chain(&events, "not-genesis");
        assert!(!report.valid);
        assert_eq!(report.first_invalid_event, Some(0));
    }
}
