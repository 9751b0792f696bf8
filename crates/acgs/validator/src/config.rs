use serde::{Deserialize, Serialize};

use crate::error::ValidatorError;

/// How many scenarios the semantic tier requires to match.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "value")]
pub enum ScenarioThreshold {
    All,
    MandatoryOnly,
    /// Minimum pass rate over all scenarios, in [0, 1].
    Fraction(f64),
}

/// Bias scan settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    /// Risk at or above this is human-review-recommended.
    pub advisory_threshold: f64,
    /// Risk at or above this is human-review-required.
    pub required_threshold: f64,
    pub counterfactual_weight: f64,
    pub direction_weight: f64,
    pub disparity_weight: f64,
    pub protected_attributes: Vec<String>,
    /// Synthetic individuals per group.
    pub population_per_group: usize,
    pub seed: u64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            advisory_threshold: 0.5,
            required_threshold: 0.8,
            counterfactual_weight: 0.4,
            direction_weight: 0.2,
            disparity_weight: 0.4,
            protected_attributes: [
                "gender",
                "sex",
                "race",
                "ethnicity",
                "age",
                "religion",
                "nationality",
                "disability",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            population_per_group: 100,
            seed: 0x5eed,
        }
    }
}

/// Validator settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub scenario_threshold: ScenarioThreshold,
    pub bias: BiasConfig,
    /// Nesting depth above which the safety scan flags a rule.
    pub max_nesting: usize,
    /// Resolve conflicts with differing priorities automatically.
    pub auto_resolve_conflicts: bool,
    /// Assignment cap for conflict and formal model search.
    pub search_limit: u64,
    pub formal_timeout_ms: u64,
    /// Evaluation step budget per rule evaluation.
    pub eval_step_budget: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            scenario_threshold: ScenarioThreshold::All,
            bias: BiasConfig::default(),
            max_nesting: 16,
            auto_resolve_conflicts: true,
            search_limit: 20_000,
            formal_timeout_ms: 2_000,
            eval_step_budget: 10_000,
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<(), ValidatorError> {
        let b = &self.bias;
        if !(0.0..=1.0).contains(&b.advisory_threshold)
            || !(0.0..=1.0).contains(&b.required_threshold)
            || b.advisory_threshold > b.required_threshold
        {
            return Err(ValidatorError::InvalidConfig(format!(
                "bias thresholds must satisfy 0 <= advisory ({}) <= required ({}) <= 1",
                b.advisory_threshold, b.required_threshold
            )));
        }
        let weights = [b.counterfactual_weight, b.direction_weight, b.disparity_weight];
        if weights.iter().any(|w| *w < 0.0) || (weights.iter().sum::<f64>() - 1.0).abs() > 1e-6 {
            return Err(ValidatorError::InvalidConfig(
                "bias weights must be non-negative and sum to 1".into(),
            ));
        }
        if let ScenarioThreshold::Fraction(f) = self.scenario_threshold {
            if !(0.0..=1.0).contains(&f) {
                return Err(ValidatorError::InvalidConfig(format!(
                    "scenario fraction {} outside [0, 1]",
                    f
                )));
            }
        }
        if self.eval_step_budget == 0 || self.search_limit == 0 {
            return Err(ValidatorError::InvalidConfig(
                "step budget and search limit must be positive".into(),
            ));
        }
        Ok(())
    }
}
