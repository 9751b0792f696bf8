//! The fidelity monitor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use acgs_types::{EnforcementDecision, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::appeal::{Appeal, AppealLedger, AppealSeverity};
use crate::config::FidelityConfig;
use crate::error::FidelityError;
use crate::score::{weighted_score, FidelityComponents, FidelityScore, FidelityStatus};
use crate::trackers::{
    AdaptationTracker, EnforcementAccuracyTracker, SatisfactionTracker, SynthesisTracker,
};

/// Emitted when the status band changes into degraded or critical.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FidelityAlert {
    pub status: FidelityStatus,
    pub previous: Option<FidelityStatus>,
    pub score: f64,
    pub freeze_until: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

const PRUNE_FLOOR: f64 = 1e-4;

struct Inner {
    synthesis: SynthesisTracker,
    accuracy: EnforcementAccuracyTracker,
    adaptation: AdaptationTracker,
    satisfaction: SatisfactionTracker,
    appeals: AppealLedger,
    history: VecDeque<FidelityScore>,
    freeze_until: Option<DateTime<Utc>>,
}

/// Shared monitor handle.
#[derive(Clone)]
pub struct FidelityMonitor {
    config: Arc<FidelityConfig>,
    inner: Arc<RwLock<Inner>>,
    alerts: broadcast::Sender<FidelityAlert>,
    running: Arc<AtomicBool>,
}

impl FidelityMonitor {
    pub fn new(config: FidelityConfig) -> Result<Self, FidelityError> {
        config.validate()?;
        let (alerts, _) = broadcast::channel(64);
        let inner = Inner {
            synthesis: SynthesisTracker::new(config.window),
            accuracy: EnforcementAccuracyTracker::new(config.window),
            adaptation: AdaptationTracker::new(config.window),
            satisfaction: SatisfactionTracker::new(config.window),
            appeals: AppealLedger::default(),
            history: VecDeque::new(),
            freeze_until: None,
        };
        Ok(Self {
            config: Arc::new(config),
            inner: Arc::new(RwLock::new(inner)),
            alerts,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &FidelityConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FidelityAlert> {
        self.alerts.subscribe()
    }

    pub fn record_synthesis(&self, promoted: bool) {
        self.inner.write().expect("lock not poisoned").synthesis.record(promoted);
    }

    /// Compare a decision with a held-out ground-truth verdict.
    pub fn record_ground_truth(&self, decision: &EnforcementDecision, truth: Verdict) {
        self.inner
            .write()
            .expect("lock not poisoned")
            .accuracy
            .record_decision(decision, truth);
    }

    pub fn record_generations_to_compliance(&self, generations: u32) {
        self.inner
            .write()
            .expect("lock not poisoned")
            .adaptation
            .record(generations);
    }

    pub fn record_satisfaction(&self, satisfaction: f64) -> Result<(), FidelityError> {
        self.inner
            .write()
            .expect("lock not poisoned")
            .satisfaction
            .record(satisfaction)
    }

    /// File an appeal. High-severity appeals recompute immediately and
    /// return the new score.
    pub fn file_appeal(&self, appeal: Appeal) -> Option<FidelityScore> {
        let severity = appeal.severity;
        info!(
            appeal_id = %appeal.id,
            severity = ?severity,
            principle_id = ?appeal.principle_id,
            "appeal filed"
        );
        self.inner.write().expect("lock not poisoned").appeals.file(appeal);
        (severity == AppealSeverity::High).then(|| self.recompute())
    }

    pub fn components(&self) -> FidelityComponents {
        let inner = self.inner.read().expect("lock not poisoned");
        FidelityComponents {
            synthesis_success: inner.synthesis.rate(),
            enforcement_accuracy: inner.accuracy.accuracy(),
            adaptation_velocity: inner.adaptation.velocity(),
            stakeholder_satisfaction: inner.satisfaction.satisfaction(),
        }
    }

    pub fn recompute(&self) -> FidelityScore {
        self.recompute_at(Utc::now())
    }

    /// Recompute as of `now`, record the score and alert on band changes.
    pub fn recompute_at(&self, now: DateTime<Utc>) -> FidelityScore {
        let components = self.components();
        let mut inner = self.inner.write().expect("lock not poisoned");
        inner.appeals.prune(now, &self.config, PRUNE_FLOOR);
        let appeal_penalty = inner.appeals.penalty_at(now, &self.config);
        let score = weighted_score(&components, &self.config.weights, appeal_penalty);
        let status = FidelityStatus::classify(score, &self.config);
        let previous = inner.history.back().map(|s| s.status);

        // The freeze runs for a full cooldown after the last critical reading.
        if status == FidelityStatus::Critical {
            inner.freeze_until =
                Some(now + chrono::Duration::seconds(self.config.freeze_cooldown_secs as i64));
        }
        let freeze_until = inner.freeze_until.filter(|until| *until > now);
        inner.freeze_until = freeze_until;

        let result = FidelityScore {
            score,
            components,
            appeal_penalty,
            status,
            freeze_until,
            computed_at: now,
        };
        inner.history.push_back(result.clone());
        if inner.history.len() > self.config.max_history {
            inner.history.pop_front();
        }
        drop(inner);

        if status.is_alert() && previous != Some(status) {
            match status {
                FidelityStatus::Critical => error!(
                    score,
                    appeal_penalty,
                    freeze_until = ?freeze_until,
                    "fidelity critical, amendment freeze recommended"
                ),
                _ => warn!(score, appeal_penalty, "fidelity degraded"),
            }
            let _ = self.alerts.send(FidelityAlert {
                status,
                previous,
                score,
                freeze_until,
                at: now,
            });
        } else if previous.is_some_and(|p| p.is_alert()) && !status.is_alert() {
            info!(score, "fidelity recovered");
        }
        result
    }

    pub fn current(&self) -> Option<FidelityScore> {
        self.inner.read().expect("lock not poisoned").history.back().cloned()
    }

    pub fn history(&self) -> Vec<FidelityScore> {
        self.inner
            .read()
            .expect("lock not poisoned")
            .history
            .iter()
            .cloned()
            .collect()
    }

    /// Whether an amendment freeze is recommended at `now`.
    pub fn freeze_active(&self, now: DateTime<Utc>) -> bool {
        self.inner
            .read()
            .expect("lock not poisoned")
            .freeze_until
            .is_some_and(|until| until > now)
    }

    /// Recompute on the configured interval until [`stop`](Self::stop).
    pub fn spawn_periodic(&self) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let monitor = self.clone();
        let period = Duration::from_secs(self.config.recompute_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            info!(interval_secs = period.as_secs(), "fidelity monitor started");
            loop {
                interval.tick().await;
                if !monitor.running.load(Ordering::SeqCst) {
                    break;
                }
                monitor.recompute();
            }
            info!("fidelity monitor stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
