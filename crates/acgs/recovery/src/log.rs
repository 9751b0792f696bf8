//! Append-only record of dispatched strategies and their outcomes.
//!
//! Effectiveness is derived from the log, never stored. Mapping changes the
//! log suggests are returned as [`MappingProposal`]s for a reviewer; nothing
//! here mutates a strategy map.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use acgs_types::PrincipleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{FailureClass, StrategyFamily, StrategyMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyOutcome {
    /// The next attempt was promoted.
    Succeeded,
    /// The next attempt failed again.
    Failed,
    Escalated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum LogEntry {
    Dispatched {
        seq: u64,
        principle_id: PrincipleId,
        attempt: u32,
        failure: FailureClass,
        family: StrategyFamily,
        at: DateTime<Utc>,
    },
    Resolved {
        seq: u64,
        outcome: StrategyOutcome,
        at: DateTime<Utc>,
    },
}

/// Success statistics for one (failure class, strategy family) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyEffectiveness {
    pub failure: FailureClass,
    pub family: StrategyFamily,
    pub dispatched: usize,
    pub resolved: usize,
    pub succeeded: usize,
}

impl StrategyEffectiveness {
    /// Successes over resolved dispatches; 0 when none resolved.
    pub fn success_rate(&self) -> f64 {
        if self.resolved == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.resolved as f64
        }
    }
}

/// Suggested mapping change awaiting review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingProposal {
    pub failure: FailureClass,
    pub current: StrategyFamily,
    pub suggested: StrategyFamily,
    pub current_rate: f64,
    pub suggested_rate: f64,
    pub samples: usize,
}

#[derive(Default)]
struct Inner {
    entries: Vec<LogEntry>,
    next_seq: u64,
}

/// Shared strategy log.
#[derive(Clone, Default)]
pub struct RecoveryLog {
    inner: Arc<RwLock<Inner>>,
}

impl RecoveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dispatch; returns its sequence number.
    pub fn record_dispatch(
        &self,
        principle_id: &PrincipleId,
        attempt: u32,
        failure: FailureClass,
        family: StrategyFamily,
    ) -> u64 {
        let mut inner = self.inner.write().expect("lock not poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push(LogEntry::Dispatched {
            seq,
            principle_id: principle_id.clone(),
            attempt,
            failure,
            family,
            at: Utc::now(),
        });
        seq
    }

    /// Append the outcome of an earlier dispatch. Unknown or already
    /// resolved sequence numbers are ignored.
    pub fn record_outcome(&self, seq: u64, outcome: StrategyOutcome) {
        let mut inner = self.inner.write().expect("lock not poisoned");
        let dispatched = inner
            .entries
            .iter()
            .any(|e| matches!(e, LogEntry::Dispatched { seq: s, .. } if *s == seq));
        let resolved = inner
            .entries
            .iter()
            .any(|e| matches!(e, LogEntry::Resolved { seq: s, .. } if *s == seq));
        if !dispatched || resolved {
            warn!(seq, "outcome for unknown or resolved dispatch ignored");
            return;
        }
        inner.entries.push(LogEntry::Resolved {
            seq,
            outcome,
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.read().expect("lock not poisoned").entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("lock not poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn effectiveness(&self) -> Vec<StrategyEffectiveness> {
        let entries = self.entries();
        let mut outcomes: BTreeMap<u64, StrategyOutcome> = BTreeMap::new();
        for e in &entries {
            if let LogEntry::Resolved { seq, outcome, .. } = e {
                outcomes.insert(*seq, *outcome);
            }
        }
        let mut stats: BTreeMap<(FailureClass, StrategyFamily), StrategyEffectiveness> =
            BTreeMap::new();
        for e in &entries {
            if let LogEntry::Dispatched {
                seq,
                failure,
                family,
                ..
            } = e
            {
                let s = stats
                    .entry((*failure, *family))
                    .or_insert_with(|| StrategyEffectiveness {
                        failure: *failure,
                        family: *family,
                        dispatched: 0,
                        resolved: 0,
                        succeeded: 0,
                    });
                s.dispatched += 1;
                if let Some(outcome) = outcomes.get(seq) {
                    s.resolved += 1;
                    if *outcome == StrategyOutcome::Succeeded {
                        s.succeeded += 1;
                    }
                }
            }
        }
        stats.into_values().collect()
    }

    /// Failure classes where another non-escalating family has a strictly
    /// better success rate than the mapped one, both with at least
    /// `min_samples` resolved dispatches.
    pub fn propose_changes(&self, map: &StrategyMap, min_samples: usize) -> Vec<MappingProposal> {
        let stats = self.effectiveness();
        let mut proposals = Vec::new();
        for current in stats.iter().filter(|s| s.resolved >= min_samples) {
            if map.family_for(current.failure) != current.family {
                continue;
            }
            let best = stats
                .iter()
                .filter(|s| {
                    s.failure == current.failure
                        && s.family != current.family
                        && s.family != StrategyFamily::Escalate
                        && s.resolved >= min_samples
                })
                .max_by(|a, b| a.success_rate().total_cmp(&b.success_rate()));
            if let Some(best) = best {
                if best.success_rate() > current.success_rate() {
                    proposals.push(MappingProposal {
                        failure: current.failure,
                        current: current.family,
                        suggested: best.family,
                        current_rate: current.success_rate(),
                        suggested_rate: best.success_rate(),
                        samples: current.resolved + best.resolved,
                    });
                }
            }
        }
        proposals
    }
}
