//! Fidelity monitor configuration.

use serde::{Deserialize, Serialize};

use crate::error::FidelityError;

/// Component weights; must sum to 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FidelityWeights {
    pub synthesis_success: f64,
    pub enforcement_accuracy: f64,
    pub adaptation_velocity: f64,
    pub stakeholder_satisfaction: f64,
}

impl Default for FidelityWeights {
    fn default() -> Self {
        Self {
            synthesis_success: 0.3,
            enforcement_accuracy: 0.3,
            adaptation_velocity: 0.2,
            stakeholder_satisfaction: 0.2,
        }
    }
}

impl FidelityWeights {
    pub fn sum(&self) -> f64 {
        self.synthesis_success
            + self.enforcement_accuracy
            + self.adaptation_velocity
            + self.stakeholder_satisfaction
    }
}

/// Undecayed penalty per appeal severity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityPenalties {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            low: 0.02,
            medium: 0.05,
            high: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FidelityConfig {
    pub weights: FidelityWeights,
    pub penalties: SeverityPenalties,
    /// Appeal penalty half-life.
    pub appeal_half_life_secs: u64,
    /// Scores at or above are healthy.
    pub healthy_threshold: f64,
    /// Scores at or above (and below healthy) are degraded; below is critical.
    pub degraded_threshold: f64,
    /// Recommended amendment freeze after the most recent critical score.
    pub freeze_cooldown_secs: u64,
    pub recompute_interval_secs: u64,
    /// Samples kept per tracker.
    pub window: usize,
    pub max_history: usize,
}

impl Default for FidelityConfig {
    fn default() -> Self {
        Self {
            weights: FidelityWeights::default(),
            penalties: SeverityPenalties::default(),
            appeal_half_life_secs: 3600,
            healthy_threshold: 0.8,
            degraded_threshold: 0.6,
            freeze_cooldown_secs: 24 * 3600,
            recompute_interval_secs: 60,
            window: 200,
            max_history: 100,
        }
    }
}

impl FidelityConfig {
    pub fn validate(&self) -> Result<(), FidelityError> {
        let w = &self.weights;
        for (name, value) in [
            ("synthesis_success", w.synthesis_success),
            ("enforcement_accuracy", w.enforcement_accuracy),
            ("adaptation_velocity", w.adaptation_velocity),
            ("stakeholder_satisfaction", w.stakeholder_satisfaction),
            ("penalties.low", self.penalties.low),
            ("penalties.medium", self.penalties.medium),
            ("penalties.high", self.penalties.high),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FidelityError::InvalidConfig(format!(
                    "{} = {} outside [0, 1]",
                    name, value
                )));
            }
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return Err(FidelityError::InvalidConfig(format!(
                "weights sum to {}, expected 1",
                w.sum()
            )));
        }
        if !(0.0 < self.degraded_threshold
            && self.degraded_threshold < self.healthy_threshold
            && self.healthy_threshold <= 1.0)
        {
            return Err(FidelityError::InvalidConfig(format!(
                "thresholds must satisfy 0 < degraded ({}) < healthy ({}) <= 1",
                self.degraded_threshold, self.healthy_threshold
            )));
        }
        if self.appeal_half_life_secs == 0 || self.recompute_interval_secs == 0 {
            return Err(FidelityError::InvalidConfig(
                "half-life and recompute interval must be positive".into(),
            ));
        }
        if self.window == 0 {
            return Err(FidelityError::InvalidConfig("window must be positive".into()));
        }
        Ok(())
    }
}
