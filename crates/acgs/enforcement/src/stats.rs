//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

use acgs_types::{EnforcementDecision, Verdict};
use serde::{Deserialize, Serialize};

/// Point-in-time copy of the engine counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnforcementStats {
    pub evaluations: u64,
    pub cache_hits: u64,
    pub fail_safes: u64,
    pub allowed: u64,
    pub warned: u64,
    pub denied: u64,
    pub runtime_conflicts: u64,
    pub max_latency_us: u64,
}

impl EnforcementStats {
    pub fn cache_hit_rate(&self) -> f64 {
        if self.evaluations == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / self.evaluations as f64
    }
}

/// Lock-free counters updated on every decision.
#[derive(Default)]
pub struct EngineStats {
    evaluations: AtomicU64,
    cache_hits: AtomicU64,
    fail_safes: AtomicU64,
    allowed: AtomicU64,
    warned: AtomicU64,
    denied: AtomicU64,
    runtime_conflicts: AtomicU64,
    max_latency_us: AtomicU64,
}

impl EngineStats {
    pub fn record(&self, decision: &EnforcementDecision) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        if decision.cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if decision.fail_safe.is_some() {
            self.fail_safes.fetch_add(1, Ordering::Relaxed);
        }
        let counter = match decision.verdict {
            Verdict::Allow => &self.allowed,
            Verdict::Warn => &self.warned,
            Verdict::Deny => &self.denied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.runtime_conflicts
            .fetch_add(decision.conflicts.len() as u64, Ordering::Relaxed);
        self.max_latency_us
            .fetch_max(decision.latency_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EnforcementStats {
        EnforcementStats {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            fail_safes: self.fail_safes.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            warned: self.warned.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            runtime_conflicts: self.runtime_conflicts.load(Ordering::Relaxed),
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
        }
    }
}
