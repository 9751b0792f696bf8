//! Decision cache keyed by (proposal fingerprint, rule-set version).

use std::sync::atomic::{AtomicU64, Ordering};

use acgs_types::{ContentHash, EnforcementDecision};
use dashmap::DashMap;
use tracing::debug;

pub struct DecisionCache {
    entries: DashMap<(ContentHash, u64), EnforcementDecision>,
    version: AtomicU64,
    capacity: usize,
    evictions: AtomicU64,
}

impl DecisionCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            version: AtomicU64::new(0),
            capacity,
            evictions: AtomicU64::new(0),
        }
    }

    /// Note the rule-set version a caller is about to use. A newer version
    /// drops every entry cached for older ones.
    pub fn observe(&self, version: u64) {
        let previous = self.version.fetch_max(version, Ordering::AcqRel);
        if version > previous {
            self.entries.retain(|key, _| key.1 >= version);
            debug!(from = previous, to = version, "decision cache invalidated");
        }
    }

    pub fn get(&self, fingerprint: &ContentHash, version: u64) -> Option<EnforcementDecision> {
        self.entries
            .get(&(fingerprint.clone(), version))
            .map(|entry| entry.value().clone())
    }

    /// Cache a decision. Fail-safe decisions and decisions for superseded
    /// versions are dropped.
    pub fn insert(&self, decision: &EnforcementDecision) {
        if self.capacity == 0
            || decision.fail_safe.is_some()
            || decision.rule_set_version < self.version.load(Ordering::Acquire)
        {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.clear();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(capacity = self.capacity, "decision cache full, flushed");
        }
        self.entries.insert(
            (decision.fingerprint.clone(), decision.rule_set_version),
            decision.clone(),
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Times the cache was flushed for capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
