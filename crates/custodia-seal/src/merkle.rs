//! Merkle batch roots over sealed events.
//!
//! A [`MerkleBatch`] summarizes an ordered run of sealed events with a
//! single RFC 6962-style SHA-256 root. Batches are derived, not
//! authoritative: the hash chain remains the integrity mechanism of record,
//! and recomputing a batch root from its member events must always
//! reproduce the stored value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::sealed::SealedEvent;

// Domain-separation prefixes (RFC 6962) so leaf and interior hashes can
// never collide.
const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash a leaf: `SHA256(0x00 || data)`.
fn hash_leaf(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash an interior node: `SHA256(0x01 || left || right)`.
fn hash_node(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Compute the Merkle root over the given event hashes, in order.
///
/// Returns all-zeros for an empty input. Lone right-hand nodes are promoted
/// unchanged (RFC 6962 §2.1). Iterative bottom-up reduction, no recursion.
pub fn compute_root(event_hashes: &[&str]) -> [u8; 32] {
    if event_hashes.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<[u8; 32]> = event_hashes
        .iter()
        .map(|h| hash_leaf(h.as_bytes()))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        while i < level.len() {
            if i + 1 < level.len() {
                next.push(hash_node(&level[i], &level[i + 1]));
            } else {
                next.push(level[i]);
            }
            i += 2;
        }
        level = next;
    }
    level[0]
}

/// A batch integrity proof: root hash over an ordered set of sealed events.
///
/// Read-only after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBatch {
    /// Unique batch identifier.
    pub batch_id: Uuid,
    /// Hex-encoded SHA-256 Merkle root over the member event hashes.
    pub root: String,
    /// Number of member events.
    pub size: usize,
    /// Member event ids, in sealing order.
    pub member_ids: Vec<Uuid>,
    /// When the batch was created.
    pub created_at: DateTime<Utc>,
}

impl MerkleBatch {
    /// Build a batch over the given sealed events, in order.
    pub fn from_events(events: &[SealedEvent]) -> Self {
        let hashes: Vec<&str> = events.iter().map(|e| e.event_hash.as_str()).collect();
        Self {
            batch_id: Uuid::new_v4(),
            root: hex::encode(compute_root(&hashes)),
            size: events.len(),
            member_ids: events.iter().map(|e| e.event_id).collect(),
            created_at: Utc::now(),
        }
    }

    /// Verify this batch against candidate member events.
    ///
    /// Pure: checks that the events are the recorded members in the recorded
    /// order, that each event's own hash is intact, and that the recomputed
    /// root reproduces the stored root.
    pub fn verify(&self, events: &[SealedEvent]) -> bool {
        if events.len() != self.size || events.len() != self.member_ids.len() {
            return false;
        }
        for (event, member_id) in events.iter().zip(&self.member_ids) {
            if event.event_id != *member_id {
                return false;
            }
            if event.event_hash != event.recompute_hash() {
                return false;
            }
        }
        let hashes: Vec<&str> = events.iter().map(|e| e.event_hash.as_str()).collect();
        hex::encode(compute_root(&hashes)) == self.root
    }
}
