//! Score composition and status bands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{FidelityConfig, FidelityWeights};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FidelityStatus {
    Healthy,
    /// Alert.
    Degraded,
    /// Alert and recommend an amendment freeze.
    Critical,
}

impl FidelityStatus {
    pub fn classify(score: f64, config: &FidelityConfig) -> Self {
        if score >= config.healthy_threshold {
            Self::Healthy
        } else if score >= config.degraded_threshold {
            Self::Degraded
        } else {
            Self::Critical
        }
    }

    pub fn is_alert(&self) -> bool {
        !matches!(self, Self::Healthy)
    }
}

impl std::fmt::Display for FidelityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Component values, each in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FidelityComponents {
    pub synthesis_success: f64,
    pub enforcement_accuracy: f64,
    pub adaptation_velocity: f64,
    pub stakeholder_satisfaction: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FidelityScore {
    pub score: f64,
    pub components: FidelityComponents,
    pub appeal_penalty: f64,
    pub status: FidelityStatus,
    /// Set while an amendment freeze is recommended.
    pub freeze_until: Option<DateTime<Utc>>,
    pub computed_at: DateTime<Utc>,
}

/// Weighted sum minus penalty, clamped to `[0, 1]`.
pub fn weighted_score(components: &FidelityComponents, weights: &FidelityWeights, penalty: f64) -> f64 {
    let raw = weights.synthesis_success * components.synthesis_success
        + weights.enforcement_accuracy * components.enforcement_accuracy
        + weights.adaptation_velocity * components.adaptation_velocity
        + weights.stakeholder_satisfaction * components.stakeholder_satisfaction
        - penalty;
    raw.clamp(0.0, 1.0)
}
