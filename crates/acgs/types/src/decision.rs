//! Proposals from the upstream generator and the enforcement decisions they receive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::hash::ContentHash;
use crate::principle::PrincipleId;
use crate::rule::{EnforcementMode, RuleId, Verdict};

/// A candidate submitted by the upstream evolutionary process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    /// Opaque structured payload.
    pub payload: Value,
    /// Generation counter of the upstream process, when known.
    pub generation: Option<u64>,
}

impl Proposal {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
            generation: None,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Cache key component; independent of the proposal id.
    pub fn fingerprint(&self) -> ContentHash {
        ContentHash::of_json(&self.payload)
    }
}

/// One rule that fired with a non-allow verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: RuleId,
    pub principle_id: PrincipleId,
    pub priority: u8,
    pub verdict: Verdict,
    pub mode: EnforcementMode,
    pub explanation: String,
}

impl Violation {
    /// The verdict this violation contributes to a decision.
    pub fn effective_verdict(&self) -> Verdict {
        match (self.mode, self.verdict) {
            (EnforcementMode::Mandatory, v) => v,
            (EnforcementMode::Advisory, Verdict::Allow) => Verdict::Allow,
            (EnforcementMode::Advisory, _) => Verdict::Warn,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "rule {} (principle {}, priority {}, {}): {}",
            self.rule_id, self.principle_id, self.priority, self.mode, self.explanation
        )
    }
}

/// Two fired rules with contradictory verdicts. The winner is the higher
/// priority rule, or the stricter one at equal priority.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConflict {
    pub winner: RuleId,
    pub winner_priority: u8,
    pub winner_verdict: Verdict,
    pub loser: RuleId,
    pub loser_priority: u8,
    pub loser_verdict: Verdict,
}

impl RuntimeConflict {
    /// Whether a permit won over a violation.
    pub fn permit_won(&self) -> bool {
        self.winner_verdict == Verdict::Allow
    }
}

/// Why the engine fell back to deny without a full evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FailSafeReason {
    Timeout { ceiling_ms: u64 },
    EvaluationError { rule_id: RuleId, message: String },
    Internal(String),
}

impl std::fmt::Display for FailSafeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { ceiling_ms } => {
                write!(f, "evaluation exceeded the {}ms latency ceiling", ceiling_ms)
            }
            Self::EvaluationError { rule_id, message } => {
                write!(f, "rule {} could not be evaluated: {}", rule_id, message)
            }
            Self::Internal(msg) => write!(f, "internal enforcement failure: {}", msg),
        }
    }
}

/// Immutable per-proposal decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnforcementDecision {
    pub decision_id: Uuid,
    pub proposal_id: String,
    pub fingerprint: ContentHash,
    pub verdict: Verdict,
    /// Contributing violations, highest priority first.
    pub violations: Vec<Violation>,
    /// The violation that determines the explanation shown.
    pub primary: Option<Violation>,
    /// Violations suppressed by a higher-priority permit.
    pub overridden: Vec<Violation>,
    pub conflicts: Vec<RuntimeConflict>,
    pub rule_set_version: u64,
    pub latency_us: u64,
    pub cache_hit: bool,
    pub fail_safe: Option<FailSafeReason>,
    pub decided_at: DateTime<Utc>,
}

impl EnforcementDecision {
    /// Fail-safe deny used whenever a proposal could not be evaluated.
    pub fn fail_safe(
        proposal: &Proposal,
        rule_set_version: u64,
        reason: FailSafeReason,
        latency_us: u64,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            proposal_id: proposal.id.clone(),
            fingerprint: proposal.fingerprint(),
            verdict: Verdict::Deny,
            violations: Vec::new(),
            primary: None,
            overridden: Vec::new(),
            conflicts: Vec::new(),
            rule_set_version,
            latency_us,
            cache_hit: false,
            fail_safe: Some(reason),
            decided_at: Utc::now(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    pub fn is_denied(&self) -> bool {
        self.verdict == Verdict::Deny
    }

    pub fn violated_rule_ids(&self) -> Vec<&RuleId> {
        self.violations.iter().map(|v| &v.rule_id).collect()
    }

    /// Human-readable explanation naming the deciding rule and principle.
    pub fn explanation(&self) -> String {
        if let Some(reason) = &self.fail_safe {
            return format!("denied (fail-safe): {}", reason);
        }
        match &self.primary {
            Some(primary) => {
                let mut text = format!("{}: {}", self.verdict, primary.describe());
                if self.violations.len() > 1 {
                    text.push_str(&format!(
                        " (+{} further violation(s))",
                        self.violations.len() - 1
                    ));
                }
                text
            }
            None => format!("{}: no active rule violated", self.verdict),
        }
    }

    /// Same outcome as `other`, ignoring identity, timing and cache flags.
    pub fn same_outcome(&self, other: &EnforcementDecision) -> bool {
        self.verdict == other.verdict
            && self.violations == other.violations
            && self.overridden == other.overridden
            && self.conflicts == other.conflicts
            && self.rule_set_version == other.rule_set_version
            && self.fail_safe == other.fail_safe
    }
}
