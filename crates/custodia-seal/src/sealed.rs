//! SealedEvent: a single hash-chained audit record.
//!
//! Each sealed event embeds the hash of its predecessor via `prev_hash`,
//! forming a singly linked, append-only chain rooted at the well-known
//! genesis hash. Once sealed, `event_hash`, `prev_hash`, and `signature`
//! are never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use custodia_types::{ActorIdentity, Severity};

/// The sentinel value used as `prev_hash` for the very first event.
pub const GENESIS_HASH: &str = "genesis";

/// Label of the hash algorithm recorded in every chain link.
pub const HASH_ALGORITHM: &str = "sha-256";

/// An encrypted sensitive payload: AES-256-GCM ciphertext with its
/// per-call nonce. The nonce is random for every seal and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// 96-bit GCM nonce, hex-encoded.
    pub nonce: String,
    /// Ciphertext (including the GCM tag), base64-encoded.
    pub ciphertext: String,
}

/// The (hash, previous hash, algorithm, timestamp) tuple embedded in each
/// sealed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashChainLink {
    pub hash: String,
    pub prev_hash: String,
    pub algorithm: String,
    pub timestamp: DateTime<Utc>,
}

/// A sealed, immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedEvent {
    /// Identifier of the audit event this record seals.
    pub event_id: Uuid,
    /// When the underlying decision was made.
    pub timestamp: DateTime<Utc>,
    /// Who performed the audited operation.
    pub actor: ActorIdentity,
    /// The resource operated on.
    pub resource: String,
    /// The operation performed.
    pub action: String,
    /// Rule category of the operation.
    pub category: String,
    /// Maximum violation severity of the decision.
    pub severity: Severity,
    /// Decision metadata, including the violation list.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Encrypted sensitive payload, if the event carried one.
    pub encrypted_payload: Option<EncryptedPayload>,
    /// Random per-event hashing nonce, hex-encoded.
    pub nonce: String,
    /// Hash of the preceding sealed event (or the genesis sentinel).
    pub prev_hash: String,
    /// This event's own hash.
    pub event_hash: String,
    /// Hash algorithm label (`"sha-256"`).
    pub algorithm: String,
    /// Optional P-256 ECDSA signature over `event_hash`, hex-encoded.
    pub signature: Option<String>,
}

impl SealedEvent {
    /// Recompute this event's hash from its fields.
    ///
    /// Compare the result against `self.event_hash` to detect tampering.
    pub fn recompute_hash(&self) -> String {
        compute_event_hash(
            &self.event_id,
            &self.timestamp,
            &self.actor,
            &self.resource,
            &self.action,
            &self.category,
            self.severity,
            &self.metadata,
            self.encrypted_payload.as_ref(),
            &self.prev_hash,
            &self.nonce,
        )
    }

    /// The chain link tuple for this event.
    pub fn chain_link(&self) -> HashChainLink {
        HashChainLink {
            hash: self.event_hash.clone(),
            prev_hash: self.prev_hash.clone(),
            algorithm: self.algorithm.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Compute the SHA-256 hash of an event's canonical form.
///
/// Every field is fed to the hasher behind a big-endian u64 length prefix
/// (maps in `serde_json`'s sorted-key encoding, the optional payload behind
/// a one-byte presence tag). The encoding is unambiguous: no two distinct
/// events share a hash input, so content cannot be shifted across field
/// boundaries without changing the hash.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_event_hash(
    event_id: &Uuid,
    timestamp: &DateTime<Utc>,
    actor: &ActorIdentity,
    resource: &str,
    action: &str,
    category: &str,
    severity: Severity,
    metadata: &serde_json::Map<String, serde_json::Value>,
    encrypted_payload: Option<&EncryptedPayload>,
    prev_hash: &str,
    nonce: &str,
) -> String {
    let mut hasher = Sha256::new();
    hash_field(&mut hasher, event_id.to_string().as_bytes());
    hash_field(&mut hasher, timestamp.to_rfc3339().as_bytes());
    hash_field(
        &mut hasher,
        serde_json::to_string(actor).unwrap_or_default().as_bytes(),
    );
    hash_field(&mut hasher, resource.as_bytes());
    hash_field(&mut hasher, action.as_bytes());
    hash_field(&mut hasher, category.as_bytes());
    hash_field(&mut hasher, severity.to_string().as_bytes());
    hash_field(
        &mut hasher,
        serde_json::to_string(metadata).unwrap_or_default().as_bytes(),
    );
    match encrypted_payload {
        Some(payload) => {
            hasher.update([1u8]);
            hash_field(&mut hasher, payload.nonce.as_bytes());
            hash_field(&mut hasher, payload.ciphertext.as_bytes());
        }
        None => hasher.update([0u8]),
    }
    hash_field(&mut hasher, prev_hash.as_bytes());
    hash_field(&mut hasher, nonce.as_bytes());
    hex::encode(hasher.finalize())
}

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
