//! Candidate and active rule metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::hash::ContentHash;
use crate::principle::PrincipleId;
use crate::report::TierName;

/// Identifier of a synthesized rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Content-derived id: the same body from the same principle always
    /// gets the same id.
    pub fn derive(principle: &PrincipleId, body: &str) -> Self {
        let hash = ContentHash::hash(format!("{}\n{}", principle, body).as_bytes());
        Self(format!("{}#{}", principle, &hash.to_hex()[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outcome of a rule or of an enforcement decision.
///
/// Ordered by strictness: `Allow < Warn < Deny`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verdict {
    Allow,
    Warn,
    Deny,
}

impl Verdict {
    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::Allow)
    }

    /// Whether two verdicts disagree about the same input.
    pub fn contradicts(&self, other: &Verdict) -> bool {
        matches!(
            (self, other),
            (Self::Allow, Self::Deny)
                | (Self::Deny, Self::Allow)
                | (Self::Allow, Self::Warn)
                | (Self::Warn, Self::Allow)
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "warn" => Some(Self::Warn),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Warn => write!(f, "warn"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Whether an active rule can deny on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnforcementMode {
    Mandatory,
    /// Demoted by conflict resolution or promoted with advisory standing.
    /// Violations only ever produce `warn`.
    Advisory,
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mandatory => write!(f, "mandatory"),
            Self::Advisory => write!(f, "advisory"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Pending,
    Passed,
    Failed { tier: TierName },
}

/// Result of formal verification of a rule against principle intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VerificationOutcome {
    Proved,
    Disproved { counterexample: Value },
    /// Not applicable, including solver timeouts.
    Inapplicable { reason: String },
}

impl VerificationOutcome {
    pub fn is_disproved(&self) -> bool {
        matches!(self, Self::Disproved { .. })
    }
}

/// Recorded human sign-off that allows a rule to bypass failed tiers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanApproval {
    pub approver: String,
    pub approved_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl HumanApproval {
    pub fn new(approver: impl Into<String>) -> Self {
        Self {
            approver: approver.into(),
            approved_at: Utc::now(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Why a rule is allowed to be active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PromotionBasis {
    /// Passed every mandatory tier in the referenced report.
    Validated { report_id: Uuid },
    HumanApproved(HumanApproval),
}

/// A synthesized rule awaiting (or after) validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateRule {
    pub id: RuleId,
    pub principle_id: PrincipleId,
    /// Policy-language text.
    pub body: String,
    /// Oracle confidence in [0, 1].
    pub confidence: f64,
    /// Which oracle produced this candidate.
    pub oracle_id: String,
    /// Synthesis attempt number for the source principle.
    pub attempt: u32,
    pub status: ValidationStatus,
    pub verification: Option<VerificationOutcome>,
    /// Set when the oracle output was malformed.
    pub synthesis_issue: Option<String>,
}

impl CandidateRule {
    pub fn new(principle_id: PrincipleId, body: impl Into<String>, oracle_id: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            id: RuleId::derive(&principle_id, &body),
            principle_id,
            body,
            confidence: 0.5,
            oracle_id: oracle_id.into(),
            attempt: 1,
            status: ValidationStatus::Pending,
            verification: None,
            synthesis_issue: None,
        }
    }

    pub fn with_confidence(mut self, c: f64) -> Self {
        self.confidence = c.clamp(0.0, 1.0);
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.synthesis_issue = Some(issue.into());
        self
    }

    pub fn is_malformed(&self) -> bool {
        self.synthesis_issue.is_some()
    }
}
