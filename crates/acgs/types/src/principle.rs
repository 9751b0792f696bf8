//! Principles: the natural-language constitution and its validation criteria.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::rule::Verdict;

/// Identifier of a constitutional principle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipleId(pub String);

impl PrincipleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How far a principle can be formally checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Formalizability {
    FormallyVerifiable,
    PartiallyVerifiable,
    Heuristic,
    HumanRequired,
}

impl Formalizability {
    /// Whether the formal verification tier runs at all.
    pub fn runs_formal_tier(&self) -> bool {
        matches!(self, Self::FormallyVerifiable | Self::PartiallyVerifiable)
    }

    /// Whether a formal verification failure blocks promotion.
    pub fn formal_tier_mandatory(&self) -> bool {
        matches!(self, Self::FormallyVerifiable)
    }
}

impl fmt::Display for Formalizability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormallyVerifiable => write!(f, "formally-verifiable"),
            Self::PartiallyVerifiable => write!(f, "partially-verifiable"),
            Self::Heuristic => write!(f, "heuristic"),
            Self::HumanRequired => write!(f, "human-required"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipleStatus {
    Active,
    /// Retired by amendment. Kept for audit, never enforced.
    Retired,
}

/// A given/when/then validation scenario.
///
/// `given` is ambient context, `when` is the proposal under test. Fields in
/// `when` shadow fields in `given` with the same name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub given: Value,
    pub when: Value,
    pub then: Verdict,
    /// Mandatory scenarios must pass under every threshold policy.
    pub mandatory: bool,
}

impl Scenario {
    pub fn new(name: impl Into<String>, when: Value, then: Verdict) -> Self {
        Self {
            name: name.into(),
            given: Value::Object(Default::default()),
            when,
            then,
            mandatory: true,
        }
    }

    pub fn with_given(mut self, given: Value) -> Self {
        self.given = given;
        self
    }

    pub fn advisory(mut self) -> Self {
        self.mandatory = false;
        self
    }

    /// The merged payload a rule is evaluated against.
    pub fn input(&self) -> Value {
        let mut merged = match &self.given {
            Value::Object(map) => map.clone(),
            _ => Default::default(),
        };
        match &self.when {
            Value::Object(map) => {
                for (k, v) in map {
                    merged.insert(k.clone(), v.clone());
                }
                Value::Object(merged)
            }
            other if merged.is_empty() => other.clone(),
            _ => Value::Object(merged),
        }
    }
}

/// A constitutional principle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Principle {
    pub id: PrincipleId,
    /// Ordinal priority; higher wins ties and conflicts.
    pub priority: u8,
    pub description: String,
    pub scenarios: Vec<Scenario>,
    pub formalizability: Formalizability,
    /// Risk/ambiguity summary in [0, 1]; recomputed after each attempt.
    pub distance_score: f64,
    pub safety_critical: bool,
    /// Intent encoded as a rule-language condition: the rule must fire
    /// exactly when this holds.
    pub formal_spec: Option<String>,
    /// Bumped on every amendment.
    pub revision: u32,
    pub status: PrincipleStatus,
}

impl Principle {
    pub fn new(id: impl Into<String>, priority: u8, description: impl Into<String>) -> Self {
        Self {
            id: PrincipleId::new(id),
            priority,
            description: description.into(),
            scenarios: Vec::new(),
            formalizability: Formalizability::Heuristic,
            distance_score: 0.5,
            safety_critical: false,
            formal_spec: None,
            revision: 1,
            status: PrincipleStatus::Active,
        }
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_formalizability(mut self, f: Formalizability) -> Self {
        self.formalizability = f;
        self
    }

    pub fn with_formal_spec(mut self, spec: impl Into<String>) -> Self {
        self.formal_spec = Some(spec.into());
        self
    }

    pub fn safety_critical(mut self) -> Self {
        self.safety_critical = true;
        self
    }

    pub fn with_distance_score(mut self, score: f64) -> Self {
        self.distance_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PrincipleStatus::Active
    }

    /// A principle can be synthesized only with a description and criteria.
    pub fn is_synthesizable(&self) -> bool {
        !self.description.trim().is_empty() && !self.scenarios.is_empty()
    }

    pub fn mandatory_scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter().filter(|s| s.mandatory)
    }
}
