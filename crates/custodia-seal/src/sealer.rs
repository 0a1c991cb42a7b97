//! The event sealer: owns the hash-chain cursor and the key material.
//!
//! Sealing is ordered through a single [`EventSealer`] instance, which is in
//! turn owned by the one background sealing task (or guarded by a mutex when
//! shared). The cursor advances only when a seal fully succeeds, so a failed
//! seal never leaves a gap in the chain -- the next event links to the last
//! good hash.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use custodia_types::{AuditEvent, CustodiaError, EventStatus, PipelineConfig};

use crate::sealed::{compute_event_hash, EncryptedPayload, SealedEvent, HASH_ALGORITHM};

/// Injected key material for sealing.
///
/// Keys are always injected, never derived from event content. The
/// encryption key is mandatory only for events that carry a sensitive
/// payload; the signing key is optional throughout.
pub struct SealerKeys {
    encryption: Option<Aes256Gcm>,
    signing: Option<SigningKey>,
}

impl SealerKeys {
    /// No encryption, no signing. Events with sensitive payloads will fail
    /// to seal.
    pub fn none() -> Self {
        Self {
            encryption: None,
            signing: None,
        }
    }

    /// Add an AES-256-GCM encryption key.
    pub fn with_encryption_key(mut self, key: &[u8; 32]) -> Self {
        self.encryption = Some(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)));
        self
    }

    /// Add a P-256 ECDSA signing key.
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing = Some(key);
        self
    }

    /// Build keys from the hex-encoded material in the pipeline config.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, CustodiaError> {
        let mut keys = Self::none();

        if let Some(key_hex) = &config.encryption_key_hex {
            let bytes = hex::decode(key_hex)
                .map_err(|e| CustodiaError::Config(format!("bad encryption key hex: {e}")))?;
            let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                CustodiaError::Config("encryption key must be exactly 32 bytes".into())
            })?;
            keys = keys.with_encryption_key(&key);
        }

        if let Some(key_hex) = &config.signing_key_hex {
            let bytes = hex::decode(key_hex)
                .map_err(|e| CustodiaError::Config(format!("bad signing key hex: {e}")))?;
            let signing = SigningKey::from_slice(&bytes)
                .map_err(|e| CustodiaError::Config(format!("bad signing key: {e}")))?;
            keys = keys.with_signing_key(signing);
        }

        Ok(keys)
    }

    /// Decrypt a sealed payload back to its JSON form.
    ///
    /// Intended for authorized audit review, not the request path.
    pub fn decrypt(
        &self,
        payload: &EncryptedPayload,
    ) -> Result<serde_json::Value, CustodiaError> {
        let cipher = self
            .encryption
            .as_ref()
            .ok_or_else(|| CustodiaError::Sealing("no encryption key configured".into()))?;

        let nonce_bytes = hex::decode(&payload.nonce)
            .map_err(|e| CustodiaError::Sealing(format!("bad payload nonce: {e}")))?;
        let ciphertext = BASE64
            .decode(&payload.ciphertext)
            .map_err(|e| CustodiaError::Sealing(format!("bad payload ciphertext: {e}")))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CustodiaError::Sealing("payload decryption failed".into()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| CustodiaError::Sealing(format!("decrypted payload is not JSON: {e}")))
    }

    fn encrypt(&self, payload: &serde_json::Value) -> Result<EncryptedPayload, CustodiaError> {
        let cipher = self.encryption.as_ref().ok_or_else(|| {
            CustodiaError::Sealing(
                "event carries a sensitive payload but no encryption key is configured".into(),
            )
        })?;

        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| CustodiaError::Sealing(format!("failed to serialize payload: {e}")))?;

        // Fresh random 96-bit nonce per call. GCM nonce reuse under one key
        // is catastrophic.
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref())
            .map_err(|_| CustodiaError::Sealing("payload encryption failed".into()))?;

        Ok(EncryptedPayload {
            nonce: hex::encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    fn sign(&self, event_hash: &str) -> Option<String> {
        self.signing.as_ref().map(|key| {
            let signature: Signature = key.sign(event_hash.as_bytes());
            hex::encode(signature.to_bytes())
        })
    }
}

/// Seals audit events into the hash chain.
pub struct EventSealer {
    keys: SealerKeys,
    /// The chain tip. Single-writer, append-only cursor.
    prev_hash: String,
}

impl EventSealer {
    /// Create a sealer resuming from a known chain tip (usually the audit
    /// store's latest hash).
    pub fn new(keys: SealerKeys, chain_tip: impl Into<String>) -> Self {
        Self {
            keys,
            prev_hash: chain_tip.into(),
        }
    }

    /// Create a sealer starting a fresh chain at the genesis sentinel.
    pub fn genesis(keys: SealerKeys) -> Self {
        Self::new(keys, crate::sealed::GENESIS_HASH)
    }

    /// The hash the next sealed event will link to.
    pub fn chain_tip(&self) -> &str {
        &self.prev_hash
    }

    /// Reset the cursor to a known-good tip.
    ///
    /// Used when a sealed event could not be persisted: the store's latest
    /// hash is still the old tip, so the next seal must link to it rather
    /// than to the event that was never stored.
    pub fn rewind(&mut self, chain_tip: impl Into<String>) {
        self.prev_hash = chain_tip.into();
    }

    /// Seal one audit event.
    ///
    /// Encrypts the sensitive payload (if any), computes the chained hash,
    /// signs it, advances the cursor, and marks the event `Sealed`. On any
    /// error the cursor and the event's status are left untouched: the
    /// failed event is simply not part of the chain.
    pub fn seal(&mut self, event: &mut AuditEvent) -> Result<SealedEvent, CustodiaError> {
        let encrypted_payload = match &event.sensitive_payload {
            Some(payload) => Some(self.keys.encrypt(payload)?),
            None => None,
        };

        let mut nonce_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = hex::encode(nonce_bytes);

        let event_hash = compute_event_hash(
            &event.id,
            &event.timestamp,
            &event.actor,
            &event.resource,
            &event.action,
            &event.category,
            event.severity,
            &event.metadata,
            encrypted_payload.as_ref(),
            &self.prev_hash,
            &nonce,
        );

        let signature = self.keys.sign(&event_hash);

        let sealed = SealedEvent {
            event_id: event.id,
            timestamp: event.timestamp,
            actor: event.actor.clone(),
            resource: event.resource.clone(),
            action: event.action.clone(),
            category: event.category.clone(),
            severity: event.severity,
            metadata: event.metadata.clone(),
            encrypted_payload,
            nonce,
            prev_hash: self.prev_hash.clone(),
            event_hash,
            algorithm: HASH_ALGORITHM.into(),
            signature,
        };

        // Advance the cursor only once the seal is fully built.
        self.prev_hash = sealed.event_hash.clone();
        event.status = EventStatus::Sealed;
        debug!(event_id = %sealed.event_id, hash = %sealed.event_hash, "event sealed");

        Ok(sealed)
    }
}
