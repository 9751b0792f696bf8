//! Enforcement configuration.

use serde::{Deserialize, Serialize};

use crate::error::EnforcementError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    /// Hard ceiling for one evaluation; overrun means fail-safe deny.
    pub latency_ceiling_ms: u64,
    /// Evaluator step budget per rule.
    pub eval_step_budget: u64,
    /// Maximum cached decisions before the cache is flushed.
    pub cache_capacity: usize,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            latency_ceiling_ms: 50,
            eval_step_budget: 10_000,
            cache_capacity: 10_000,
        }
    }
}

impl EnforcementConfig {
    pub fn with_latency_ceiling_ms(mut self, ms: u64) -> Self {
        self.latency_ceiling_ms = ms;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), EnforcementError> {
        if self.latency_ceiling_ms == 0 {
            return Err(EnforcementError::InvalidConfig(
                "latency_ceiling_ms must be positive".into(),
            ));
        }
        if self.eval_step_budget == 0 {
            return Err(EnforcementError::InvalidConfig(
                "eval_step_budget must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(EnforcementConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_ceiling_rejected() {
        let config = EnforcementConfig::default().with_latency_ceiling_ms(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_disables_cache_but_is_valid() {
        let config = EnforcementConfig::default().with_cache_capacity(0);
        assert!(config.validate().is_ok());
    }
}
