//! Multi-scope fixed-window rate limiter.
//!
//! One `consume()` call checks every scope that applies to the request
//! (global, per-address, per-principal) and is all-or-nothing: if any scope
//! is exhausted, nothing is consumed anywhere and the denial carries a
//! deterministic retry-after derived from the remaining window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use custodia_types::{ActorIdentity, RateLimitConfig, ScopeLimit};

/// The scope classes a request can be limited under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateScope {
    Global,
    Address,
    Principal,
}

impl std::fmt::Display for RateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateScope::Global => write!(f, "global"),
            RateScope::Address => write!(f, "address"),
            RateScope::Principal => write!(f, "principal"),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateCheck {
    Allowed,
    /// At least one scope is exhausted. `retry_after` is the time until the
    /// denying scope's window resets.
    Denied { retry_after: Duration },
}

impl RateCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateCheck::Allowed)
    }
}

/// One fixed window for one scope key.
struct Bucket {
    window_start: Instant,
    used: u32,
}

/// Fixed-window rate limiter over (scope, key) buckets.
///
/// A single mutex over the bucket map makes the check-then-consume of one
/// request atomic with respect to concurrent requests.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(RateScope, String), Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that allows everything. Only for deployments that opt out
    /// of rate limiting explicitly.
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check and consume one point in every scope applicable to `actor`.
    ///
    /// All-or-nothing: on denial no scope is charged, so a burst that trips
    /// the global limit does not also eat into per-actor budgets.
    pub fn consume(&self, actor: &ActorIdentity) -> RateCheck {
        if !self.config.enabled {
            return RateCheck::Allowed;
        }

        let scopes = self.applicable_scopes(actor);
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");

        // Pass 1: check every scope without mutating.
        for (scope, key, limit) in &scopes {
            let window = Duration::from_secs(limit.window_secs);
            if let Some(bucket) = buckets.get(&(*scope, key.clone())) {
                let elapsed = now.duration_since(bucket.window_start);
                if elapsed < window && bucket.used >= limit.capacity {
                    let retry_after = window - elapsed;
                    debug!(scope = %scope, key = %key, ?retry_after, "rate limit exceeded");
                    return RateCheck::Denied { retry_after };
                }
            }
        }

        // Pass 2: all scopes have room, consume one point in each.
        for (scope, key, limit) in scopes {
            let window = Duration::from_secs(limit.window_secs);
            let bucket = buckets
                .entry((scope, key))
                .or_insert_with(|| Bucket {
                    window_start: now,
                    used: 0,
                });
            if now.duration_since(bucket.window_start) >= window {
                bucket.window_start = now;
                bucket.used = 0;
            }
            bucket.used += 1;
        }

        RateCheck::Allowed
    }

    /// Drop buckets whose window has fully elapsed.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        buckets.retain(|(scope, _), bucket| {
            let limit = match scope {
                RateScope::Global => &self.config.global,
                RateScope::Address => &self.config.per_address,
                RateScope::Principal => &self.config.per_principal,
            };
            now.duration_since(bucket.window_start) < Duration::from_secs(limit.window_secs)
        });
    }

    fn applicable_scopes(&self, actor: &ActorIdentity) -> Vec<(RateScope, String, ScopeLimit)> {
        let mut scopes = vec![(
            RateScope::Global,
            "*".to_string(),
            self.config.global.clone(),
        )];
        if let Some(address) = &actor.address {
            scopes.push((
                RateScope::Address,
                address.clone(),
                self.config.per_address.clone(),
            ));
        }
        if let Some(principal) = &actor.principal {
            scopes.push((
                RateScope::Principal,
                principal.clone(),
                self.config.per_principal.clone(),
            ));
        }
        scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(global: u32, per_address: u32, per_principal: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            global: ScopeLimit {
                capacity: global,
                window_secs: 60,
            },
            per_address: ScopeLimit {
                capacity: per_address,
                window_secs: 60,
            },
            per_principal: ScopeLimit {
                capacity: per_principal,
                window_secs: 60,
            },
        }
    }

    fn actor(principal: &str, address: &str) -> ActorIdentity {
        ActorIdentity::anonymous()
            .with_principal(principal)
            .with_address(address)
    }

    #[test]
    fn allows_up_to_capacity_then_denies() {
        let limiter = RateLimiter::new(config(100, 100, 3));
        let a = actor("user-1", "10.0.0.1");

        for _ in 0..3 {
            assert!(limiter.consume(&a).is_allowed());
        }
        match limiter.consume(&a) {
            RateCheck::Denied { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(60));
            }
            RateCheck::Allowed => panic!("expected denial at capacity + 1"),
        }
    }

    #[test]
    fn principals_have_independent_budgets() {
        let limiter = RateLimiter::new(config(100, 100, 2));
        let a = actor("user-1", "10.0.0.1");
        let b = actor("user-2", "10.0.0.2");

        assert!(limiter.consume(&a).is_allowed());
        assert!(limiter.consume(&a).is_allowed());
        assert!(!limiter.consume(&a).is_allowed());
        assert!(limiter.consume(&b).is_allowed());
    }

    #[test]
    fn denial_consumes_nothing() {
        // Address budget of 1 is exhausted by the first request; the second
        // request (same address, new principal) is denied and must not charge
        // the new principal's budget.
        let limiter = RateLimiter::new(config(100, 1, 1));
        assert!(limiter.consume(&actor("user-1", "10.0.0.1")).is_allowed());
        assert!(!limiter.consume(&actor("user-2", "10.0.0.1")).is_allowed());
        assert!(limiter.consume(&actor("user-2", "10.0.0.2")).is_allowed());
    }

    #[test]
    fn global_scope_caps_everyone() {
        let limiter = RateLimiter::new(config(2, 100, 100));
        assert!(limiter.consume(&actor("user-1", "10.0.0.1")).is_allowed());
        assert!(limiter.consume(&actor("user-2", "10.0.0.2")).is_allowed());
        assert!(!limiter.consume(&actor("user-3", "10.0.0.3")).is_allowed());
    }

    #[test]
    fn anonymous_actor_only_hits_global() {
        let limiter = RateLimiter::new(config(100, 1, 1));
        let anon = ActorIdentity::anonymous();
        for _ in 0..5 {
            assert!(limiter.consume(&anon).is_allowed());
        }
    }

    #[test]
    fn disabled_limiter_allows_everything() {
        let limiter = RateLimiter::disabled();
        assert!(!limiter.is_enabled());
        let a = actor("user-1", "10.0.0.1");
        for _ in 0..10_000 {
            assert!(limiter.consume(&a).is_allowed());
        }
    }

    #[test]
    fn window_elapse_restores_budget() {
        let mut cfg = config(100, 100, 1);
        cfg.per_principal.window_secs = 1;
        let limiter = RateLimiter::new(cfg);
        let a = actor("user-1", "10.0.0.1");

        assert!(limiter.consume(&a).is_allowed());
        assert!(!limiter.consume(&a).is_allowed());
        std::thread::sleep(Duration::from_millis(1100));
        assert!(limiter.consume(&a).is_allowed());
    }

    #[test]
    fn prune_drops_stale_buckets() {
        let mut cfg = config(100, 100, 1);
        cfg.global.window_secs = 1;
        cfg.per_address.window_secs = 1;
        cfg.per_principal.window_secs = 1;
        let limiter = RateLimiter::new(cfg);
        limiter.consume(&actor("user-1", "10.0.0.1"));

        std::thread::sleep(Duration::from_millis(1100));
        limiter.prune();
        assert!(limiter.buckets.lock().unwrap().is_empty());
    }
}
