//! Tamper-evident sealing of audit events.
//!
//! Every decided operation becomes a [`SealedEvent`]: hashed with SHA-256,
//! linked to its predecessor through `prev_hash`, optionally encrypted
//! (sensitive payloads, AES-256-GCM) and signed (P-256 ECDSA). Sealed
//! events are periodically summarized into [`MerkleBatch`] roots for compact
//! integrity proofs, and persisted through the [`AuditSink`] seam.

pub mod chain;
pub mod merkle;
pub mod sealed;
pub mod sealer;
pub mod store;

pub use chain::{verify_chain, ChainReport};
pub use merkle::MerkleBatch;
pub use sealed::{EncryptedPayload, SealedEvent, GENESIS_HASH, HASH_ALGORITHM};
pub use sealer::{EventSealer, SealerKeys};
pub use store::{AuditSink, SqliteAuditStore};
