use std::sync::RwLock;

use acgs_types::{
    BiasBand, GovernanceFault, Principle, SafetyFindingKind, TierFindings, TierName,
    ValidationReport, VerificationOutcome,
};
use tracing::{info, warn};

use crate::config::{FailureClass, RecoveryConfig, StrategyFamily, StrategyMap};
use crate::error::RecoveryError;
use crate::log::{MappingProposal, RecoveryLog, StrategyOutcome};
use crate::strategy::{RecoveryStrategy, CANONICAL_TEMPLATE};

/// Choose a strategy for a failed validation. Pure: the same inputs always
/// give the same strategy.
///
/// `attempt_count` counts failed attempts including this one; once it
/// exceeds `config.retry_budget` the result is always an escalation.
pub fn select(
    map: &StrategyMap,
    config: &RecoveryConfig,
    protected_fields: &[String],
    principle: &Principle,
    report: &ValidationReport,
    attempt_count: u32,
) -> RecoveryStrategy {
    if attempt_count > config.retry_budget {
        return budget_exhausted(principle, attempt_count);
    }
    let Some(blocking) = report.first_blocking() else {
        return RecoveryStrategy::EscalateHumanReview {
            reason: "recovery requested for a report with no blocking tier".into(),
            fault: GovernanceFault::ValidationTierFailure {
                tier: TierName::Syntax,
                detail: "nothing to recover".into(),
            },
        };
    };
    let fault = fault_for(blocking.tier, &blocking.detail, report);
    let escalate = |reason: String| RecoveryStrategy::EscalateHumanReview {
        reason,
        fault: fault.clone(),
    };

    match map.family_for(FailureClass::from(blocking.tier)) {
        StrategyFamily::TemplateRepair => RecoveryStrategy::TemplateRepair {
            template: CANONICAL_TEMPLATE.into(),
            errors: vec![format!("{} tier: {}", blocking.tier, blocking.detail)],
        },
        StrategyFamily::Decomposition => {
            let failed_scenarios = match &blocking.findings {
                TierFindings::Semantic {
                    failed_scenarios, ..
                } => failed_scenarios.clone(),
                _ => Vec::new(),
            };
            let violating = principle
                .scenarios
                .iter()
                .filter(|s| s.then.is_violation())
                .count();
            if violating < 2 {
                // Nothing finer to split into.
                RecoveryStrategy::TemplateRepair {
                    template: CANONICAL_TEMPLATE.into(),
                    errors: failed_scenarios
                        .iter()
                        .map(|s| format!("scenario '{}' did not match", s))
                        .collect(),
                }
            } else {
                RecoveryStrategy::Decomposition { failed_scenarios }
            }
        }
        StrategyFamily::ConstraintInjection => {
            let forbidden = match &blocking.findings {
                TierFindings::Safety { findings } => {
                    let mut out: Vec<String> = Vec::new();
                    for f in findings {
                        let pattern = match f.kind {
                            SafetyFindingKind::UnboundedIteration => "(loop".to_string(),
                            SafetyFindingKind::UnsafeBuiltin => "(call".to_string(),
                            SafetyFindingKind::PermissiveWildcard
                            | SafetyFindingKind::ExcessiveNesting => f.construct.clone(),
                        };
                        if !out.contains(&pattern) {
                            out.push(pattern);
                        }
                    }
                    out
                }
                _ => Vec::new(),
            };
            RecoveryStrategy::ConstraintInjection { forbidden }
        }
        StrategyFamily::FairnessConstraints => match report.bias_band() {
            Some(BiasBand::HumanReviewRequired) => RecoveryStrategy::FairnessConstraints {
                constraints: config.fairness_constraints.clone(),
                excluded_fields: protected_fields.to_vec(),
            },
            _ => escalate("bias failure outside the mandatory band".into()),
        },
        StrategyFamily::PriorityResolution => {
            let conflicts = report.conflicts().to_vec();
            if !conflicts.is_empty() && conflicts.iter().all(|c| c.resolvable()) {
                RecoveryStrategy::PriorityResolution { conflicts }
            } else {
                escalate("conflict between rules of equal priority".into())
            }
        }
        StrategyFamily::Escalate => escalate(format!("{} failures are mapped to review", blocking.tier)),
    }
}

/// Choose a strategy when synthesis produced nothing to validate.
pub fn select_for_synthesis(
    map: &StrategyMap,
    config: &RecoveryConfig,
    principle: &Principle,
    fault: &GovernanceFault,
    attempt_count: u32,
) -> RecoveryStrategy {
    if attempt_count > config.retry_budget {
        return budget_exhausted(principle, attempt_count);
    }
    match map.family_for(FailureClass::Synthesis) {
        StrategyFamily::Escalate => RecoveryStrategy::EscalateHumanReview {
            reason: "synthesis failures are mapped to review".into(),
            fault: fault.clone(),
        },
        _ => RecoveryStrategy::TemplateRepair {
            template: CANONICAL_TEMPLATE.into(),
            errors: vec![fault.to_string()],
        },
    }
}

fn budget_exhausted(principle: &Principle, attempts: u32) -> RecoveryStrategy {
    let fault = GovernanceFault::RecoveryBudgetExhausted {
        principle_id: principle.id.clone(),
        attempts,
    };
    RecoveryStrategy::EscalateHumanReview {
        reason: fault.to_string(),
        fault,
    }
}

fn fault_for(tier: TierName, detail: &str, report: &ValidationReport) -> GovernanceFault {
    match tier {
        TierName::Conflict => match report.conflicts().iter().find(|c| c.resolution().is_none()) {
            Some(c) => GovernanceFault::ConflictUnresolved {
                first: c.first.clone(),
                second: c.second.clone(),
            },
            None => GovernanceFault::ValidationTierFailure {
                tier,
                detail: detail.to_string(),
            },
        },
        TierName::Formal => match report.verification() {
            Some(VerificationOutcome::Disproved { counterexample }) => {
                GovernanceFault::FormalVerificationDisproved(counterexample.to_string())
            }
            _ => GovernanceFault::ValidationTierFailure {
                tier,
                detail: detail.to_string(),
            },
        },
        TierName::Syntax if detail.starts_with("malformed synthesis output") => {
            GovernanceFault::SynthesisMalformed(detail.to_string())
        }
        _ => GovernanceFault::ValidationTierFailure {
            tier,
            detail: detail.to_string(),
        },
    }
}

/// A dispatched strategy and the log entry tracking its outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatch {
    pub strategy: RecoveryStrategy,
    pub seq: u64,
}

/// Selection plus the append-only strategy log.
pub struct RecoveryDispatcher {
    config: RecoveryConfig,
    map: RwLock<StrategyMap>,
    protected_fields: Vec<String>,
    log: RecoveryLog,
}

impl RecoveryDispatcher {
    pub fn new(config: RecoveryConfig) -> Result<Self, RecoveryError> {
        config.validate()?;
        Ok(Self {
            map: RwLock::new(config.strategy_map.clone()),
            config,
            protected_fields: Vec::new(),
            log: RecoveryLog::new(),
        })
    }

    /// Fields the fairness strategy tells the synthesizer to ignore.
    pub fn with_protected_fields(mut self, fields: Vec<String>) -> Self {
        self.protected_fields = fields;
        self
    }

    pub fn with_log(mut self, log: RecoveryLog) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn log(&self) -> &RecoveryLog {
        &self.log
    }

    pub fn strategy_map(&self) -> StrategyMap {
        self.map.read().expect("lock not poisoned").clone()
    }

    pub fn dispatch(
        &self,
        principle: &Principle,
        report: &ValidationReport,
        attempt_count: u32,
    ) -> Dispatch {
        let map = self.strategy_map();
        let strategy = select(
            &map,
            &self.config,
            &self.protected_fields,
            principle,
            report,
            attempt_count,
        );
        let failure = report
            .first_blocking()
            .map(|o| FailureClass::from(o.tier))
            .unwrap_or(FailureClass::Syntax);
        self.logged(principle, attempt_count, failure, strategy)
    }

    pub fn dispatch_synthesis_failure(
        &self,
        principle: &Principle,
        fault: &GovernanceFault,
        attempt_count: u32,
    ) -> Dispatch {
        let map = self.strategy_map();
        let strategy = select_for_synthesis(&map, &self.config, principle, fault, attempt_count);
        self.logged(principle, attempt_count, FailureClass::Synthesis, strategy)
    }

    fn logged(
        &self,
        principle: &Principle,
        attempt: u32,
        failure: FailureClass,
        strategy: RecoveryStrategy,
    ) -> Dispatch {
        let seq = self
            .log
            .record_dispatch(&principle.id, attempt, failure, strategy.family());
        if let RecoveryStrategy::EscalateHumanReview { reason, .. } = &strategy {
            warn!(
                principle_id = %principle.id,
                attempt,
                %failure,
                reason = %reason,
                "recovery escalated to human review"
            );
            self.log.record_outcome(seq, StrategyOutcome::Escalated);
        } else {
            info!(
                principle_id = %principle.id,
                attempt,
                %failure,
                strategy = %strategy.family(),
                "recovery strategy dispatched"
            );
        }
        Dispatch { strategy, seq }
    }

    pub fn record_outcome(&self, dispatch: &Dispatch, outcome: StrategyOutcome) {
        self.log.record_outcome(dispatch.seq, outcome);
    }

    /// Mapping changes the strategy log supports. Nothing is applied.
    pub fn proposals(&self) -> Vec<MappingProposal> {
        self.log
            .propose_changes(&self.strategy_map(), self.config.min_samples_for_proposal)
    }

    /// Apply a reviewed proposal.
    pub fn accept_proposal(&self, proposal: &MappingProposal, reviewer: &str) {
        let mut map = self.map.write().expect("lock not poisoned");
        map.set(proposal.failure, proposal.suggested);
        info!(
            failure = %proposal.failure,
            from = %proposal.current,
            to = %proposal.suggested,
            reviewer,
            "strategy mapping changed after review"
        );
    }
}
