//! Validation reports: the immutable per-attempt tier record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::principle::PrincipleId;
use crate::rule::{RuleId, Verdict, VerificationOutcome};

/// The six validation tiers, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TierName {
    Syntax,
    Semantic,
    Safety,
    Bias,
    Conflict,
    Formal,
}

impl TierName {
    pub const ALL: [TierName; 6] = [
        TierName::Syntax,
        TierName::Semantic,
        TierName::Safety,
        TierName::Bias,
        TierName::Conflict,
        TierName::Formal,
    ];
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Semantic => write!(f, "semantic"),
            Self::Safety => write!(f, "safety"),
            Self::Bias => write!(f, "bias"),
            Self::Conflict => write!(f, "conflict"),
            Self::Formal => write!(f, "formal"),
        }
    }
}

/// Bias risk bands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BiasBand {
    AutoPass,
    /// Recorded as an advisory failure; does not block promotion.
    HumanReviewRecommended,
    /// Mandatory block.
    HumanReviewRequired,
}

impl BiasBand {
    /// Classify a risk score. `advisory` and `required` are the lower and
    /// upper thresholds.
    pub fn classify(risk: f64, advisory: f64, required: f64) -> Self {
        if risk >= required {
            Self::HumanReviewRequired
        } else if risk >= advisory {
            Self::HumanReviewRecommended
        } else {
            Self::AutoPass
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafetyFindingKind {
    UnboundedIteration,
    PermissiveWildcard,
    UnsafeBuiltin,
    ExcessiveNesting,
}

impl fmt::Display for SafetyFindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundedIteration => write!(f, "unbounded-iteration"),
            Self::PermissiveWildcard => write!(f, "permissive-wildcard"),
            Self::UnsafeBuiltin => write!(f, "unsafe-builtin"),
            Self::ExcessiveNesting => write!(f, "excessive-nesting"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafetyFinding {
    pub kind: SafetyFindingKind,
    /// The offending construct, rendered back to text.
    pub construct: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Contradictory verdicts on a shared input.
    Contradiction,
    /// Both rules restrict a shared input with different strengths
    /// (`warn` against `deny`).
    Overlap,
}

/// A detected conflict between two rules.
///
/// The pair is stored in rule-id order so detection from either side
/// produces an identical record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub first: RuleId,
    pub first_priority: u8,
    pub first_verdict: Verdict,
    pub second: RuleId,
    pub second_priority: u8,
    pub second_verdict: Verdict,
    pub kind: ConflictKind,
    /// An input on which both rules fire.
    pub witness: Value,
}

impl ConflictRecord {
    pub fn new(
        a: (RuleId, u8, Verdict),
        b: (RuleId, u8, Verdict),
        kind: ConflictKind,
        witness: Value,
    ) -> Self {
        let (first, second) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        Self {
            first: first.0,
            first_priority: first.1,
            first_verdict: first.2,
            second: second.0,
            second_priority: second.1,
            second_verdict: second.2,
            kind,
            witness,
        }
    }

    pub fn involves(&self, id: &RuleId) -> bool {
        self.first == *id || self.second == *id
    }

    pub fn other(&self, id: &RuleId) -> Option<&RuleId> {
        if self.first == *id {
            Some(&self.second)
        } else if self.second == *id {
            Some(&self.first)
        } else {
            None
        }
    }

    /// Resolvable automatically when priorities differ.
    pub fn resolvable(&self) -> bool {
        self.first_priority != self.second_priority
    }

    /// (winner, loser) when priorities differ.
    pub fn resolution(&self) -> Option<ConflictResolution> {
        if self.first_priority > self.second_priority {
            Some(ConflictResolution {
                winner: self.first.clone(),
                demoted: self.second.clone(),
            })
        } else if self.second_priority > self.first_priority {
            Some(ConflictResolution {
                winner: self.second.clone(),
                demoted: self.first.clone(),
            })
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub winner: RuleId,
    /// Kept active with advisory standing.
    pub demoted: RuleId,
}

/// Structured findings attached to a tier outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TierFindings {
    None,
    Syntax {
        error: Option<String>,
    },
    Semantic {
        failed_scenarios: Vec<String>,
        pass_rate: f64,
    },
    Safety {
        findings: Vec<SafetyFinding>,
    },
    Bias {
        risk: f64,
        band: BiasBand,
        counterfactual_rate: f64,
        direction_similarity: f64,
        outcome_disparity: f64,
    },
    Conflict {
        conflicts: Vec<ConflictRecord>,
        resolutions: Vec<ConflictResolution>,
    },
    Formal {
        outcome: VerificationOutcome,
    },
}

/// One tier's result inside a report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierOutcome {
    pub tier: TierName,
    pub passed: bool,
    pub mandatory: bool,
    pub detail: String,
    pub duration_us: u64,
    pub findings: TierFindings,
}

impl TierOutcome {
    pub fn blocks_promotion(&self) -> bool {
        self.mandatory && !self.passed
    }
}

/// Immutable record of one validation attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub id: Uuid,
    pub principle_id: PrincipleId,
    pub principle_revision: u32,
    pub rule_id: RuleId,
    pub attempt: u32,
    /// Rule-set version the conflict tier checked against.
    #[serde(default)]
    pub rule_set_version: u64,
    pub outcomes: Vec<TierOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ValidationReport {
    /// Promotable iff every mandatory tier ran and passed.
    ///
    /// Tiers that were skipped because an earlier mandatory tier failed are
    /// absent, so a short-circuited report is never promotable.
    pub fn promotable(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| !o.blocks_promotion())
    }

    pub fn first_blocking(&self) -> Option<&TierOutcome> {
        self.outcomes.iter().find(|o| o.blocks_promotion())
    }

    pub fn outcome(&self, tier: TierName) -> Option<&TierOutcome> {
        self.outcomes.iter().find(|o| o.tier == tier)
    }

    pub fn advisory_failures(&self) -> impl Iterator<Item = &TierOutcome> {
        self.outcomes.iter().filter(|o| !o.mandatory && !o.passed)
    }

    pub fn bias_band(&self) -> Option<BiasBand> {
        match self.outcome(TierName::Bias).map(|o| &o.findings) {
            Some(TierFindings::Bias { band, .. }) => Some(*band),
            _ => None,
        }
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        match self.outcome(TierName::Conflict).map(|o| &o.findings) {
            Some(TierFindings::Conflict { conflicts, .. }) => conflicts,
            _ => &[],
        }
    }

    pub fn resolutions(&self) -> &[ConflictResolution] {
        match self.outcome(TierName::Conflict).map(|o| &o.findings) {
            Some(TierFindings::Conflict { resolutions, .. }) => resolutions,
            _ => &[],
        }
    }

    pub fn verification(&self) -> Option<&VerificationOutcome> {
        match self.outcome(TierName::Formal).map(|o| &o.findings) {
            Some(TierFindings::Formal { outcome }) => Some(outcome),
            _ => None,
        }
    }

    pub fn total_duration_us(&self) -> u64 {
        self.outcomes.iter().map(|o| o.duration_us).sum()
    }
}
