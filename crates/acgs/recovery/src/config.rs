use acgs_types::TierName;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RecoveryError;

/// What went wrong on an attempt, as seen by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// No candidate came back from the oracles.
    Synthesis,
    Syntax,
    Semantic,
    Safety,
    Bias,
    Conflict,
    Formal,
}

impl From<TierName> for FailureClass {
    fn from(tier: TierName) -> Self {
        match tier {
            TierName::Syntax => Self::Syntax,
            TierName::Semantic => Self::Semantic,
            TierName::Safety => Self::Safety,
            TierName::Bias => Self::Bias,
            TierName::Conflict => Self::Conflict,
            TierName::Formal => Self::Formal,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Synthesis => "synthesis",
            Self::Syntax => "syntax",
            Self::Semantic => "semantic",
            Self::Safety => "safety",
            Self::Bias => "bias",
            Self::Conflict => "conflict",
            Self::Formal => "formal",
        };
        write!(f, "{}", s)
    }
}

/// Strategy families the dispatcher can choose from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    TemplateRepair,
    Decomposition,
    ConstraintInjection,
    FairnessConstraints,
    PriorityResolution,
    Escalate,
}

impl fmt::Display for StrategyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TemplateRepair => "template-repair",
            Self::Decomposition => "decomposition",
            Self::ConstraintInjection => "constraint-injection",
            Self::FairnessConstraints => "fairness-constraints",
            Self::PriorityResolution => "priority-resolution",
            Self::Escalate => "escalate",
        };
        write!(f, "{}", s)
    }
}

/// Failure class to strategy family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyMap {
    pub synthesis: StrategyFamily,
    pub syntax: StrategyFamily,
    pub semantic: StrategyFamily,
    pub safety: StrategyFamily,
    pub bias: StrategyFamily,
    pub conflict: StrategyFamily,
    pub formal: StrategyFamily,
}

impl Default for StrategyMap {
    fn default() -> Self {
        Self {
            synthesis: StrategyFamily::TemplateRepair,
            syntax: StrategyFamily::TemplateRepair,
            semantic: StrategyFamily::Decomposition,
            safety: StrategyFamily::ConstraintInjection,
            bias: StrategyFamily::FairnessConstraints,
            conflict: StrategyFamily::PriorityResolution,
            formal: StrategyFamily::TemplateRepair,
        }
    }
}

impl StrategyMap {
    pub fn family_for(&self, class: FailureClass) -> StrategyFamily {
        match class {
            FailureClass::Synthesis => self.synthesis,
            FailureClass::Syntax => self.syntax,
            FailureClass::Semantic => self.semantic,
            FailureClass::Safety => self.safety,
            FailureClass::Bias => self.bias,
            FailureClass::Conflict => self.conflict,
            FailureClass::Formal => self.formal,
        }
    }

    pub fn set(&mut self, class: FailureClass, family: StrategyFamily) {
        let slot = match class {
            FailureClass::Synthesis => &mut self.synthesis,
            FailureClass::Syntax => &mut self.syntax,
            FailureClass::Semantic => &mut self.semantic,
            FailureClass::Safety => &mut self.safety,
            FailureClass::Bias => &mut self.bias,
            FailureClass::Conflict => &mut self.conflict,
            FailureClass::Formal => &mut self.formal,
        };
        *slot = family;
    }
}

/// Recovery settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Failed attempts tolerated before escalation. The attempt after the
    /// budget is spent always escalates.
    pub retry_budget: u32,
    pub strategy_map: StrategyMap,
    /// Added to the synthesis context by the fairness strategy.
    pub fairness_constraints: Vec<String>,
    /// Minimum resolved samples before the strategy log proposes a mapping
    /// change.
    pub min_samples_for_proposal: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            strategy_map: StrategyMap::default(),
            fairness_constraints: vec![
                "outcome must not depend on protected attributes".into(),
                "equal treatment across demographic groups".into(),
            ],
            min_samples_for_proposal: 5,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), RecoveryError> {
        if self.retry_budget == 0 {
            return Err(RecoveryError::InvalidConfig(
                "retry budget must be at least 1".into(),
            ));
        }
        if self.min_samples_for_proposal == 0 {
            return Err(RecoveryError::InvalidConfig(
                "proposal sample floor must be positive".into(),
            ));
        }
        Ok(())
    }
}
