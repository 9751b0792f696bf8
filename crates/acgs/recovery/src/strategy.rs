use acgs_synthesis::SynthesisContext;
use acgs_types::{ConflictRecord, GovernanceFault};
use serde::{Deserialize, Serialize};

use crate::config::StrategyFamily;

/// Canonical rule skeleton handed to the synthesizer on template repair.
pub const CANONICAL_TEMPLATE: &str = "(rule {name} (when {condition}) (then {verdict} \"{explanation}\"))";

/// A concrete remediation for one failed attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RecoveryStrategy {
    /// Re-prompt with a corrective template and the errors seen so far.
    TemplateRepair { template: String, errors: Vec<String> },
    /// Split the principle into sub-principles, synthesize each and
    /// recombine.
    Decomposition { failed_scenarios: Vec<String> },
    /// Re-synthesize with an explicit forbidden-construct list.
    ConstraintInjection { forbidden: Vec<String> },
    /// Re-synthesize with fairness criteria and protected fields excluded.
    FairnessConstraints {
        constraints: Vec<String>,
        excluded_fields: Vec<String>,
    },
    /// Conflicts whose priorities differ; re-validate with automatic
    /// resolution.
    PriorityResolution { conflicts: Vec<ConflictRecord> },
    EscalateHumanReview { reason: String, fault: GovernanceFault },
}

impl RecoveryStrategy {
    pub fn family(&self) -> StrategyFamily {
        match self {
            Self::TemplateRepair { .. } => StrategyFamily::TemplateRepair,
            Self::Decomposition { .. } => StrategyFamily::Decomposition,
            Self::ConstraintInjection { .. } => StrategyFamily::ConstraintInjection,
            Self::FairnessConstraints { .. } => StrategyFamily::FairnessConstraints,
            Self::PriorityResolution { .. } => StrategyFamily::PriorityResolution,
            Self::EscalateHumanReview { .. } => StrategyFamily::Escalate,
        }
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::EscalateHumanReview { .. })
    }

    /// Fold this strategy's corrections into the next attempt's context.
    pub fn apply(&self, mut context: SynthesisContext) -> SynthesisContext {
        match self {
            Self::TemplateRepair { template, errors } => {
                context = context.with_corrective_template(template.clone());
                for e in errors {
                    context = context.with_previous_error(e.clone());
                }
            }
            Self::ConstraintInjection { forbidden } => {
                for pattern in forbidden {
                    context = context.with_forbidden_pattern(pattern.clone());
                }
            }
            Self::FairnessConstraints {
                constraints,
                excluded_fields,
            } => {
                for c in constraints {
                    context = context.with_fairness_constraint(c.clone());
                }
                for f in excluded_fields {
                    context = context.with_excluded_field(f.clone());
                }
            }
            Self::Decomposition { failed_scenarios } => {
                for s in failed_scenarios {
                    context = context.with_previous_error(format!("scenario '{}' did not match", s));
                }
            }
            Self::PriorityResolution { .. } | Self::EscalateHumanReview { .. } => {}
        }
        context
    }
}
