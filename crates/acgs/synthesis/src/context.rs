use acgs_store::RuleSetSnapshot;
use acgs_types::{PrincipleId, RuleId, Verdict};
use serde::{Deserialize, Serialize};

/// Compact view of an active rule shown to the oracle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id: RuleId,
    pub principle_id: PrincipleId,
    pub priority: u8,
    pub verdict: Verdict,
    pub body: String,
}

/// Everything besides the principle itself that shapes a synthesis attempt.
///
/// Recovery strategies fill in the corrective fields between attempts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisContext {
    pub active_rules: Vec<RuleSummary>,
    /// Constructs the rule must not contain.
    pub forbidden_patterns: Vec<String>,
    pub fairness_constraints: Vec<String>,
    /// Fields a rule must not condition on.
    pub excluded_fields: Vec<String>,
    /// Rule skeleton with `{name}`, `{condition}`, `{verdict}` and
    /// `{explanation}` placeholders.
    pub corrective_template: Option<String>,
    pub previous_errors: Vec<String>,
    /// Set when synthesizing a sub-principle produced by decomposition.
    pub parent: Option<PrincipleId>,
}

impl SynthesisContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &RuleSetSnapshot) -> Self {
        Self {
            active_rules: snapshot
                .by_priority()
                .into_iter()
                .map(|r| RuleSummary {
                    id: r.id.clone(),
                    principle_id: r.principle_id.clone(),
                    priority: r.priority,
                    verdict: r.verdict(),
                    body: r.body.clone(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_forbidden_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if !self.forbidden_patterns.contains(&pattern) {
            self.forbidden_patterns.push(pattern);
        }
        self
    }

    pub fn with_fairness_constraint(mut self, constraint: impl Into<String>) -> Self {
        let constraint = constraint.into();
        if !self.fairness_constraints.contains(&constraint) {
            self.fairness_constraints.push(constraint);
        }
        self
    }

    pub fn with_excluded_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.excluded_fields.contains(&field) {
            self.excluded_fields.push(field);
        }
        self
    }

    pub fn with_corrective_template(mut self, template: impl Into<String>) -> Self {
        self.corrective_template = Some(template.into());
        self
    }

    pub fn with_previous_error(mut self, error: impl Into<String>) -> Self {
        self.previous_errors.push(error.into());
        self
    }

    pub fn with_parent(mut self, parent: PrincipleId) -> Self {
        self.parent = Some(parent);
        self
    }
}
