//! Stakeholder appeals and their decaying penalty.

use acgs_types::PrincipleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{FidelityConfig, SeverityPenalties};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealSeverity {
    Low,
    Medium,
    /// Triggers an immediate recompute.
    High,
}

impl AppealSeverity {
    pub fn penalty(&self, penalties: &SeverityPenalties) -> f64 {
        match self {
            Self::Low => penalties.low,
            Self::Medium => penalties.medium,
            Self::High => penalties.high,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appeal {
    pub id: Uuid,
    pub severity: AppealSeverity,
    pub principle_id: Option<PrincipleId>,
    pub reason: String,
    pub filed_at: DateTime<Utc>,
}

impl Appeal {
    pub fn new(severity: AppealSeverity, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            principle_id: None,
            reason: reason.into(),
            filed_at: Utc::now(),
        }
    }

    pub fn against(mut self, principle: PrincipleId) -> Self {
        self.principle_id = Some(principle);
        self
    }

    pub fn filed_at(mut self, at: DateTime<Utc>) -> Self {
        self.filed_at = at;
        self
    }

    /// Severity penalty halved every `half_life_secs`.
    pub fn penalty_at(&self, now: DateTime<Utc>, config: &FidelityConfig) -> f64 {
        let age_secs = (now - self.filed_at).num_milliseconds().max(0) as f64 / 1000.0;
        let half_life = config.appeal_half_life_secs as f64;
        self.severity.penalty(&config.penalties) * (-age_secs * 2.0_f64.ln() / half_life).exp()
    }
}

/// Appeals filed so far. Fully decayed appeals are pruned.
#[derive(Clone, Debug, Default)]
pub struct AppealLedger {
    appeals: Vec<Appeal>,
}

impl AppealLedger {
    pub fn file(&mut self, appeal: Appeal) {
        self.appeals.push(appeal);
    }

    pub fn penalty_at(&self, now: DateTime<Utc>, config: &FidelityConfig) -> f64 {
        self.appeals.iter().map(|a| a.penalty_at(now, config)).sum()
    }

    /// Drop appeals whose penalty has fallen below `floor`.
    pub fn prune(&mut self, now: DateTime<Utc>, config: &FidelityConfig, floor: f64) {
        self.appeals.retain(|a| a.penalty_at(now, config) >= floor);
    }

    pub fn for_principle<'a>(&'a self, id: &'a PrincipleId) -> impl Iterator<Item = &'a Appeal> {
        self.appeals
            .iter()
            .filter(move |a| a.principle_id.as_ref() == Some(id))
    }

    pub fn len(&self) -> usize {
        self.appeals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appeals.is_empty()
    }
}
