//! Cheap per-request gates that run before rule evaluation.
//!
//! Two gates live here: the multi-scope fixed-window rate limiter and the
//! quarantine store. Both are in-memory, lock-guarded, and designed to be
//! consulted on every request without touching the audit store.

pub mod quarantine;
pub mod rate;

pub use quarantine::{IdentityKind, QuarantineRecord, QuarantineStore};
pub use rate::{RateCheck, RateLimiter, RateScope};
