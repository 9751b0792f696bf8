//! Aggregate configuration for the governance layer.

use std::path::Path;

use acgs_enforcement::EnforcementConfig;
use acgs_fidelity::FidelityConfig;
use acgs_recovery::RecoveryConfig;
use acgs_synthesis::SynthesisConfig;
use acgs_validator::{ScenarioThreshold, ValidatorConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Every component's settings. Missing TOML sections take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub synthesis: SynthesisConfig,
    pub validator: ValidatorConfig,
    pub recovery: RecoveryConfig,
    pub enforcement: EnforcementConfig,
    pub fidelity: FidelityConfig,
}

impl GovernanceConfig {
    /// Tighter thresholds, smaller budgets and a lower latency ceiling.
    pub fn strict() -> Self {
        let mut c = Self::default();
        c.validator.scenario_threshold = ScenarioThreshold::All;
        c.validator.bias.advisory_threshold = 0.4;
        c.validator.bias.required_threshold = 0.7;
        c.validator.auto_resolve_conflicts = false;
        c.validator.formal_timeout_ms = 5_000;
        c.recovery.retry_budget = 2;
        c.enforcement.latency_ceiling_ms = 20;
        c.fidelity.healthy_threshold = 0.85;
        c.fidelity.degraded_threshold = 0.7;
        c
    }

    /// Looser thresholds and more retries, for exploration and demos.
    pub fn relaxed() -> Self {
        let mut c = Self::default();
        c.validator.scenario_threshold = ScenarioThreshold::Fraction(0.8);
        c.validator.bias.advisory_threshold = 0.6;
        c.validator.bias.required_threshold = 0.9;
        c.recovery.retry_budget = 5;
        c.enforcement.latency_ceiling_ms = 100;
        c
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.synthesis;
        if s.oracle_timeout_ms == 0 || !(0.0..=1.0).contains(&s.min_confidence) {
            return Err(ConfigError::Invalid {
                section: "synthesis",
                detail: "oracle_timeout_ms must be positive and min_confidence within [0, 1]".into(),
            });
        }
        self.validator.validate().map_err(|e| ConfigError::Invalid {
            section: "validator",
            detail: e.to_string(),
        })?;
        self.recovery.validate().map_err(|e| ConfigError::Invalid {
            section: "recovery",
            detail: e.to_string(),
        })?;
        self.enforcement.validate().map_err(|e| ConfigError::Invalid {
            section: "enforcement",
            detail: e.to_string(),
        })?;
        self.fidelity.validate().map_err(|e| ConfigError::Invalid {
            section: "fidelity",
            detail: e.to_string(),
        })?;
        Ok(())
    }
}
