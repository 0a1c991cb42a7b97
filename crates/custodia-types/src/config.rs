//! Configuration for the compliance pipeline.
//!
//! [`PipelineConfig`] is the top-level configuration controlling rate-limit
//! capacities, rule-provider timeouts, ingestion queue sizing, Merkle batch
//! cadence, quarantine TTLs, failure policy, and sealing key material.

use serde::{Deserialize, Serialize};

use crate::error::CustodiaError;

/// What the pipeline does when the audit path degrades (queue full, sealer
/// misconfigured).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Return the computed decision anyway; count and log the degradation.
    FailOpen,
    /// Block the request: an operation that cannot be audited is denied.
    FailSecure,
}

/// Capacity and window for one rate-limit scope class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeLimit {
    /// Consumptions allowed per window.
    pub capacity: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

/// Per-scope-class rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// When false, the limiter is constructed disabled and admits everything.
    pub enabled: bool,
    /// Shared limit across all requests.
    pub global: ScopeLimit,
    /// Limit per network address.
    pub per_address: ScopeLimit,
    /// Limit per principal.
    pub per_principal: ScopeLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: ScopeLimit {
                capacity: 10_000,
                window_secs: 60,
            },
            per_address: ScopeLimit {
                capacity: 120,
                window_secs: 60,
            },
            per_principal: ScopeLimit {
                capacity: 300,
                window_secs: 60,
            },
        }
    }
}

/// Top-level configuration for a pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rate-limit scopes and capacities.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    /// Upper bound on a single rule-provider call, in milliseconds.
    pub rule_timeout_ms: u64,
    /// Bounded ingestion queue capacity. When full, enqueue attempts fail
    /// with a distinguishable audit-degraded signal.
    pub queue_capacity: usize,
    /// Merkle batch size: a batch root is emitted every this many sealed
    /// events.
    pub batch_size: usize,
    /// Maximum batch age in seconds before a partial batch is flushed.
    pub batch_max_age_secs: u64,
    /// Fail-open vs. fail-secure on audit degradation.
    pub failure_policy: FailurePolicy,
    /// Default quarantine TTL in seconds for Quarantine actions.
    pub quarantine_ttl_secs: u64,
    /// Review deadline in seconds (always at or before the hard expiry).
    pub quarantine_review_secs: u64,
    /// Hex-encoded 32-byte AES-256-GCM key for sensitive payloads. Absent
    /// means events carrying payloads fail to seal.
    pub encryption_key_hex: Option<String>,
    /// Hex-encoded 32-byte P-256 signing key scalar. Absent means sealed
    /// events are unsigned.
    pub signing_key_hex: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitConfig::default(),
            rule_timeout_ms: 2_000,
            queue_capacity: 4096,
            batch_size: 64,
            batch_max_age_secs: 30,
            failure_policy: FailurePolicy::FailSecure,
            quarantine_ttl_secs: 3_600,
            quarantine_review_secs: 1_800,
            encryption_key_hex: None,
            signing_key_hex: None,
        }
    }
}

impl PipelineConfig {
    /// Validate internal consistency of the configuration.
    pub fn validate(&self) -> Result<(), CustodiaError> {
        if self.queue_capacity == 0 {
            return Err(CustodiaError::Config("queue_capacity must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(CustodiaError::Config("batch_size must be > 0".into()));
        }
        if self.rule_timeout_ms == 0 {
            return Err(CustodiaError::Config("rule_timeout_ms must be > 0".into()));
        }
        if self.quarantine_review_secs > self.quarantine_ttl_secs {
            return Err(CustodiaError::Config(
                "quarantine review deadline must not exceed the hard expiry".into(),
            ));
        }
        if let Some(key) = &self.encryption_key_hex {
            if hex::decode(key).map(|k| k.len() != 32).unwrap_or(true) {
                return Err(CustodiaError::Config(
                    "encryption_key_hex must be 32 hex-encoded bytes".into(),
                ));
            }
        }
        Ok(())
    }
}
