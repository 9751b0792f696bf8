//! The governance pipeline: synthesize, validate, recover, promote.
//!
//! One [`GovernancePipeline::govern`] run owns a single principle. Each
//! attempt produces candidates, validates all of them against the current
//! rule-set snapshot and promotes the first promotable one. A failed
//! attempt is handed to the recovery dispatcher, whose strategy shapes the
//! next attempt or ends the run with an escalation.
//!
//! Runs are cancellable: amending or retiring a principle cancels its
//! in-flight run, and a promotion racing an amendment is discarded by the
//! revision check inside the rule-set write transaction.

use std::cmp::Reverse;
use std::sync::Arc;

use acgs_enforcement::PgcEngine;
use acgs_fidelity::FidelityMonitor;
use acgs_policy_lang::compile_rule;
use acgs_recovery::{
    decompose, recombine, Dispatch, EscalationPacket, HumanReviewQueue, RecoveryDispatcher,
    RecoveryStrategy, StrategyOutcome,
};
use acgs_store::{
    ActiveRuleSet, AuditRecord, AuditSink, InMemoryAuditSink, PrincipleStore, RuleSetSnapshot,
    StoreError,
};
use acgs_synthesis::{RuleOracle, RuleSynthesizer, SynthesisContext};
use acgs_types::{
    CandidateRule, EnforcementMode, GovernanceFault, HumanApproval, Principle, PrincipleId, RuleId,
    ValidationReport,
};
use acgs_validator::{mark, promote, FormalVerifier, Promotion, TieredValidator, ValidatorError};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::{CancelRegistry, CancelToken};
use crate::config::GovernanceConfig;
use crate::distance::{describe, distance_score, DISTANCE_WINDOW};
use crate::error::KernelError;

/// Revalidations allowed when the rule set moves between validation and
/// promotion.
const MAX_RULE_SET_REFRESHES: u32 = 3;

/// How a governance run ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GovernanceOutcome {
    Promoted {
        principle_id: PrincipleId,
        rule_id: RuleId,
        version: u64,
        mode: EnforcementMode,
        attempts: u32,
        report_id: Uuid,
    },
    Escalated {
        principle_id: PrincipleId,
        escalation_id: Uuid,
        fault: GovernanceFault,
        attempts: u32,
    },
    /// The principle was amended, retired or explicitly cancelled while
    /// the run was in flight. Nothing was promoted.
    Cancelled {
        principle_id: PrincipleId,
        attempts: u32,
    },
}

impl GovernanceOutcome {
    pub fn principle_id(&self) -> &PrincipleId {
        match self {
            Self::Promoted { principle_id, .. }
            | Self::Escalated { principle_id, .. }
            | Self::Cancelled { principle_id, .. } => principle_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Promoted { attempts, .. }
            | Self::Escalated { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self, Self::Promoted { .. })
    }
}

enum Step {
    Synthesize,
    Decompose,
    /// Re-validate a candidate with automatic conflict resolution.
    Revalidate(CandidateRule),
}

enum AttemptResult {
    Promoted {
        promotion: Promotion,
        report_id: Uuid,
    },
    Failed {
        candidates: Vec<CandidateRule>,
        reports: Vec<ValidationReport>,
        /// Index of the report that got furthest through the tiers.
        best: usize,
    },
    SynthesisFailed(GovernanceFault),
    /// The principle changed between validation and promotion.
    Superseded,
}

/// Everything a run accumulates for a possible escalation packet.
#[derive(Default)]
struct RunState {
    failures: u32,
    pending: Option<Dispatch>,
    attempted: Vec<CandidateRule>,
    reports: Vec<ValidationReport>,
}

/// Orchestrates synthesis, validation, recovery and promotion over shared
/// principle and rule-set stores.
pub struct GovernancePipeline {
    config: GovernanceConfig,
    principles: PrincipleStore,
    rule_set: ActiveRuleSet,
    synthesizer: RuleSynthesizer,
    validator: TieredValidator,
    resolving_validator: TieredValidator,
    dispatcher: RecoveryDispatcher,
    review: HumanReviewQueue,
    audit: Arc<dyn AuditSink>,
    fidelity: Option<FidelityMonitor>,
    runs: CancelRegistry,
    windows: DashMap<PrincipleId, Vec<ValidationReport>>,
}

impl GovernancePipeline {
    pub fn new(
        config: GovernanceConfig,
        principles: PrincipleStore,
        rule_set: ActiveRuleSet,
    ) -> Result<Self, KernelError> {
        config.validate()?;
        let mut resolving = config.validator.clone();
        resolving.auto_resolve_conflicts = true;
        let protected = config.validator.bias.protected_attributes.clone();
        Ok(Self {
            synthesizer: RuleSynthesizer::new(config.synthesis.clone()),
            validator: TieredValidator::new(config.validator.clone())?,
            resolving_validator: TieredValidator::new(resolving)?,
            dispatcher: RecoveryDispatcher::new(config.recovery.clone())?
                .with_protected_fields(protected),
            review: HumanReviewQueue::new(),
            audit: Arc::new(InMemoryAuditSink::new()),
            fidelity: None,
            runs: CancelRegistry::new(),
            windows: DashMap::new(),
            config,
            principles,
            rule_set,
        })
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn RuleOracle>) -> Self {
        self.synthesizer = self.synthesizer.with_oracle(oracle);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_fidelity(mut self, monitor: FidelityMonitor) -> Self {
        self.fidelity = Some(monitor);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn FormalVerifier>) -> Self {
        self.validator = self.validator.with_verifier(verifier.clone());
        self.resolving_validator = self.resolving_validator.with_verifier(verifier);
        self
    }

    pub fn with_review_queue(mut self, review: HumanReviewQueue) -> Self {
        self.review = review;
        self
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn principles(&self) -> &PrincipleStore {
        &self.principles
    }

    pub fn rule_set(&self) -> &ActiveRuleSet {
        &self.rule_set
    }

    pub fn dispatcher(&self) -> &RecoveryDispatcher {
        &self.dispatcher
    }

    pub fn review_queue(&self) -> &HumanReviewQueue {
        &self.review
    }

    pub fn audit(&self) -> Arc<dyn AuditSink> {
        self.audit.clone()
    }

    pub fn fidelity(&self) -> Option<&FidelityMonitor> {
        self.fidelity.as_ref()
    }

    /// An enforcement engine reading this pipeline's rule set and writing
    /// to its audit sink.
    pub fn enforcement_engine(&self) -> Result<PgcEngine, KernelError> {
        Ok(
            PgcEngine::new(self.rule_set.clone(), self.config.enforcement.clone())?
                .with_audit(self.audit.clone()),
        )
    }

    /// Cancel the in-flight run for a principle, if any.
    pub fn cancel(&self, id: &PrincipleId) -> bool {
        self.runs.cancel(id)
    }

    pub fn is_running(&self, id: &PrincipleId) -> bool {
        self.runs.is_running(id)
    }

    /// Amend a principle and cancel its in-flight run. Its active rules
    /// stay in force until a new rule is promoted for the new revision.
    pub fn amend_principle(
        &self,
        id: &PrincipleId,
        change: impl FnOnce(&mut Principle),
    ) -> Result<Principle, KernelError> {
        let amended = self.principles.amend(id, change)?;
        self.runs.cancel(id);
        self.synthesizer.reset_attempts(id);
        self.windows.remove(id);
        info!(principle_id = %id, revision = amended.revision, "principle amended");
        Ok(amended)
    }

    /// Retire a principle, cancel its run and withdraw its rules in one
    /// rule-set version.
    pub fn retire_principle(&self, id: &PrincipleId) -> Result<u64, KernelError> {
        let mut writer = self.rule_set.begin_write();
        self.principles.retire(id)?;
        self.runs.cancel(id);
        let removed = writer.remove_principle(id);
        let version = writer.commit();
        info!(principle_id = %id, removed, version, "principle retired");
        Ok(version)
    }

    /// Promote one of an escalation's attempted rules on a reviewer's
    /// authority.
    pub fn approve_escalation(
        &self,
        escalation_id: &Uuid,
        rule_id: &RuleId,
        approval: HumanApproval,
    ) -> Result<Promotion, KernelError> {
        Ok(self.review.approve(
            escalation_id,
            rule_id,
            approval,
            &self.principles,
            &self.rule_set,
            self.audit.as_ref(),
        )?)
    }

    /// Govern every active principle concurrently, one task each.
    pub async fn govern_all(self: &Arc<Self>) -> Vec<Result<GovernanceOutcome, KernelError>> {
        let handles: Vec<_> = self
            .principles
            .active()
            .into_iter()
            .map(|p| {
                let pipeline = Arc::clone(self);
                tokio::spawn(async move { pipeline.govern(&p.id).await })
            })
            .collect();
        join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| Err(KernelError::Task(e.to_string()))))
            .collect()
    }

    /// Run synthesis, validation and recovery for one principle until a
    /// rule is promoted, the run escalates or it is cancelled.
    ///
    /// Starting a run cancels any earlier run for the same principle.
    pub async fn govern(&self, id: &PrincipleId) -> Result<GovernanceOutcome, KernelError> {
        let token = self.runs.register(id);
        let result = self.run(id, &token).await;
        self.runs.finish(id, &token);
        result
    }

    async fn run(&self, id: &PrincipleId, token: &CancelToken) -> Result<GovernanceOutcome, KernelError> {
        let start = self.principles.get(id)?;
        if !start.is_active() {
            return Err(StoreError::PrincipleRetired(id.clone()).into());
        }
        self.synthesizer.reset_attempts(id);
        info!(principle_id = %id, revision = start.revision, "governance run started");

        let mut context = SynthesisContext::new();
        let mut step = Step::Synthesize;
        let mut state = RunState::default();

        loop {
            let principle = self.principles.get(id)?;
            if token.is_cancelled() || !principle.is_active() || principle.revision != start.revision {
                return Ok(self.cancelled(id, &state));
            }
            context.active_rules = SynthesisContext::from_snapshot(&self.rule_set.snapshot()).active_rules;

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(self.cancelled(id, &state)),
                result = self.attempt(&principle, &context, &step) => result?,
            };

            let dispatch = match result {
                AttemptResult::Promoted { promotion, report_id } => {
                    return Ok(self.promoted(&principle, promotion, report_id, state));
                }
                AttemptResult::Superseded => return Ok(self.cancelled(id, &state)),
                AttemptResult::Failed {
                    candidates,
                    reports,
                    best,
                } => {
                    self.attempt_failed(&mut state);
                    let dispatch = self
                        .dispatcher
                        .dispatch(&principle, &reports[best], state.failures);
                    if let RecoveryStrategy::PriorityResolution { .. } = dispatch.strategy {
                        step = Step::Revalidate(candidates[best].clone());
                    }
                    state.attempted.extend(candidates);
                    state.reports.extend(reports);
                    dispatch
                }
                AttemptResult::SynthesisFailed(fault) => {
                    self.attempt_failed(&mut state);
                    self.dispatcher
                        .dispatch_synthesis_failure(&principle, &fault, state.failures)
                }
            };

            match &dispatch.strategy {
                RecoveryStrategy::EscalateHumanReview { reason, fault } => {
                    let attempts = state.failures;
                    let packet = EscalationPacket::new(
                        principle,
                        state.attempted,
                        state.reports,
                        reason.clone(),
                        fault.clone(),
                    );
                    let escalation_id = self.review.submit(packet, self.audit.as_ref());
                    return Ok(GovernanceOutcome::Escalated {
                        principle_id: id.clone(),
                        escalation_id,
                        fault: fault.clone(),
                        attempts,
                    });
                }
                RecoveryStrategy::PriorityResolution { .. } => {}
                RecoveryStrategy::Decomposition { .. } => {
                    context = dispatch.strategy.apply(context);
                    step = Step::Decompose;
                }
                other => {
                    context = other.apply(context);
                    step = Step::Synthesize;
                }
            }
            state.pending = Some(dispatch);
        }
    }

    fn attempt_failed(&self, state: &mut RunState) {
        if let Some(previous) = state.pending.take() {
            self.dispatcher.record_outcome(&previous, StrategyOutcome::Failed);
        }
        if let Some(monitor) = &self.fidelity {
            monitor.record_synthesis(false);
        }
        state.failures += 1;
    }

    fn promoted(
        &self,
        principle: &Principle,
        promotion: Promotion,
        report_id: Uuid,
        mut state: RunState,
    ) -> GovernanceOutcome {
        if let Some(previous) = state.pending.take() {
            self.dispatcher.record_outcome(&previous, StrategyOutcome::Succeeded);
        }
        let attempts = state.failures + 1;
        if let Some(monitor) = &self.fidelity {
            monitor.record_synthesis(true);
            monitor.record_generations_to_compliance(attempts);
        }
        info!(
            principle_id = %principle.id,
            rule_id = %promotion.rule_id,
            version = promotion.version,
            attempts,
            "governance run promoted a rule"
        );
        GovernanceOutcome::Promoted {
            principle_id: principle.id.clone(),
            rule_id: promotion.rule_id,
            version: promotion.version,
            mode: promotion.mode,
            attempts,
            report_id,
        }
    }

    fn cancelled(&self, id: &PrincipleId, state: &RunState) -> GovernanceOutcome {
        info!(principle_id = %id, attempts = state.failures, "governance run cancelled");
        GovernanceOutcome::Cancelled {
            principle_id: id.clone(),
            attempts: state.failures,
        }
    }

    async fn attempt(
        &self,
        principle: &Principle,
        context: &SynthesisContext,
        step: &Step,
    ) -> Result<AttemptResult, KernelError> {
        let snapshot = self.rule_set.snapshot();
        match step {
            Step::Synthesize => match self.synthesizer.synthesize(principle, context).await {
                Ok(candidates) => {
                    self.validate_and_promote(principle, candidates, &snapshot, &self.validator)
                        .await
                }
                Err(e) => match e.fault() {
                    Some(fault) => Ok(AttemptResult::SynthesisFailed(fault)),
                    None => Err(e.into()),
                },
            },
            Step::Decompose => match self.recombined(principle, context).await {
                Ok(candidate) => {
                    self.validate_and_promote(principle, vec![candidate], &snapshot, &self.validator)
                        .await
                }
                Err(fault) => Ok(AttemptResult::SynthesisFailed(fault)),
            },
            Step::Revalidate(candidate) => {
                self.validate_and_promote(
                    principle,
                    vec![candidate.clone()],
                    &snapshot,
                    &self.resolving_validator,
                )
                .await
            }
        }
    }

    /// Decompose, synthesize and validate each part in isolation, then
    /// merge the accepted sub-rules into one candidate for the parent.
    async fn recombined(
        &self,
        principle: &Principle,
        context: &SynthesisContext,
    ) -> Result<CandidateRule, GovernanceFault> {
        let parts = decompose(principle).map_err(|e| GovernanceFault::SynthesisMalformed(e.to_string()))?;
        let isolated = RuleSetSnapshot::default();
        let sub_context = context.clone().with_parent(principle.id.clone());
        let mut accepted = Vec::with_capacity(parts.len());

        for part in &parts {
            let candidates = self
                .synthesizer
                .synthesize(part, &sub_context)
                .await
                .map_err(|e| {
                    e.fault()
                        .unwrap_or_else(|| GovernanceFault::SynthesisMalformed(e.to_string()))
                })?;
            let reports = join_all(
                candidates
                    .iter()
                    .map(|c| self.validator.validate(c, part, &isolated)),
            )
            .await;
            let winner = candidates.iter().zip(&reports).find(|(_, r)| r.promotable());
            let Some((candidate, _)) = winner else {
                let (tier, detail) = reports
                    .iter()
                    .find_map(|r| r.first_blocking())
                    .map(|o| (o.tier, o.detail.clone()))
                    .unwrap_or((acgs_types::TierName::Syntax, "no candidates".into()));
                return Err(GovernanceFault::ValidationTierFailure {
                    tier,
                    detail: format!("sub-principle {}: {}", part.id, detail),
                });
            };
            let compiled = compile_rule(&candidate.body)
                .map_err(|e| GovernanceFault::SynthesisMalformed(e.to_string()))?;
            debug!(principle_id = %principle.id, part = %part.id, rule_id = %candidate.id, "sub-rule accepted");
            accepted.push(compiled);
        }

        let body = recombine(principle, &accepted)
            .map_err(|e| GovernanceFault::SynthesisMalformed(e.to_string()))?;
        let mut candidate = CandidateRule::new(principle.id.clone(), body, "recombination");
        candidate.attempt = self.synthesizer.attempts(&principle.id);
        info!(
            principle_id = %principle.id,
            parts = parts.len(),
            rule_id = %candidate.id,
            "sub-rules recombined"
        );
        Ok(candidate)
    }

    async fn validate_and_promote(
        &self,
        principle: &Principle,
        mut candidates: Vec<CandidateRule>,
        snapshot: &RuleSetSnapshot,
        validator: &TieredValidator,
    ) -> Result<AttemptResult, KernelError> {
        let mut reports = self
            .validate_all(principle, &mut candidates, snapshot, validator)
            .await;
        let mut refreshes = 0;

        while let Some(i) = reports.iter().position(|r| r.promotable()) {
            match promote(
                &reports[i],
                &candidates[i],
                &self.principles,
                &self.rule_set,
                self.audit.as_ref(),
            ) {
                Ok(promotion) => {
                    return Ok(AttemptResult::Promoted {
                        promotion,
                        report_id: reports[i].id,
                    })
                }
                Err(ValidatorError::Store(
                    StoreError::StaleRevision { .. } | StoreError::PrincipleRetired(_),
                )) => {
                    warn!(principle_id = %principle.id, "principle changed before promotion; candidate discarded");
                    return Ok(AttemptResult::Superseded);
                }
                Err(ValidatorError::StaleRuleSet { current, .. }) if refreshes < MAX_RULE_SET_REFRESHES => {
                    refreshes += 1;
                    debug!(principle_id = %principle.id, version = current, refreshes, "revalidating against the current rule set");
                    let fresh = self.rule_set.snapshot();
                    reports = self
                        .validate_all(principle, &mut candidates, &fresh, validator)
                        .await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let Some(best) = reports
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| Reverse(r.outcomes.len()))
            .map(|(i, _)| i)
        else {
            return Ok(AttemptResult::SynthesisFailed(GovernanceFault::OracleUnavailable(
                "no candidates to validate".into(),
            )));
        };
        Ok(AttemptResult::Failed {
            candidates,
            reports,
            best,
        })
    }

    /// Validate every candidate against one snapshot, marking and auditing
    /// each report.
    async fn validate_all(
        &self,
        principle: &Principle,
        candidates: &mut [CandidateRule],
        snapshot: &RuleSetSnapshot,
        validator: &TieredValidator,
    ) -> Vec<ValidationReport> {
        let reports = join_all(
            candidates
                .iter()
                .map(|c| validator.validate(c, principle, snapshot)),
        )
        .await;
        for (candidate, report) in candidates.iter_mut().zip(&reports) {
            mark(candidate, report);
            self.audit.record(AuditRecord::Validation(report.clone()));
        }
        self.update_distance(principle, &reports);
        reports
    }

    fn update_distance(&self, principle: &Principle, reports: &[ValidationReport]) {
        let Some(last) = reports.last() else {
            return;
        };
        let score = {
            let mut window = self.windows.entry(principle.id.clone()).or_default();
            window.extend(reports.iter().cloned());
            let excess = window.len().saturating_sub(DISTANCE_WINDOW);
            window.drain(..excess);
            distance_score(&window)
        };
        if let Some(score) = score {
            if let Err(e) = self.principles.set_distance_score(&principle.id, score, describe(last)) {
                warn!(principle_id = %principle.id, error = %e, "distance score not recorded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acgs_store::InMemoryAuditSink;
    use acgs_synthesis::{FailingOracle, FixtureOracle, OracleRequest, OracleResponse, SynthesisError, TemplateOracle};
    use acgs_types::{Proposal, Scenario, Verdict};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    fn margin() -> Principle {
        Principle::new("safety-margin", 9, "keep a safety margin of at least 0.2")
            .with_formal_spec("(< margin 0.2)")
            .with_scenario(Scenario::new("below", json!({"margin": 0.1}), Verdict::Deny))
            .with_scenario(Scenario::new("above", json!({"margin": 0.3}), Verdict::Allow))
    }

    fn limits() -> Principle {
        Principle::new("resource-limits", 7, "stay within resource limits")
            .with_scenario(Scenario::new("cpu", json!({"cpu": 95}), Verdict::Deny))
            .with_scenario(Scenario::new("mem", json!({"mem": 99}), Verdict::Deny))
            .with_scenario(Scenario::new("idle", json!({"cpu": 10, "mem": 10}), Verdict::Allow))
    }

    fn pipeline(config: GovernanceConfig, principles: Vec<Principle>) -> GovernancePipeline {
        let store = PrincipleStore::new();
        for p in principles {
            store.insert(p).unwrap();
        }
        GovernancePipeline::new(config, store, ActiveRuleSet::new()).unwrap()
    }

    /// Answers sub-principles from their scenarios but proposes an
    /// incomplete rule for the parent.
    struct PartsOnlyOracle(TemplateOracle);

    #[async_trait]
    impl RuleOracle for PartsOnlyOracle {
        fn id(&self) -> &str {
            "parts-only"
        }

        async fn propose(&self, request: &OracleRequest) -> Result<OracleResponse, SynthesisError> {
            if request.context.parent.is_some() {
                self.0.propose(request).await
            } else {
                Ok(OracleResponse::new(
                    r#"(rule cpu-only (when (> cpu 90)) (then deny "cpu"))"#,
                    0.5,
                ))
            }
        }
    }

    /// Replies with a fixed body per principle.
    struct ByPrincipleOracle(Vec<(&'static str, &'static str)>);

    #[async_trait]
    impl RuleOracle for ByPrincipleOracle {
        fn id(&self) -> &str {
            "by-principle"
        }

        async fn propose(&self, request: &OracleRequest) -> Result<OracleResponse, SynthesisError> {
            let body = self
                .0
                .iter()
                .find(|(id, _)| *id == request.principle.id.as_str())
                .map(|(_, body)| *body)
                .unwrap_or("(rule none");
            Ok(OracleResponse::new(body, 0.9))
        }
    }

    #[tokio::test]
    async fn promotes_on_first_attempt() {
        let audit = InMemoryAuditSink::new();
        let p = pipeline(GovernanceConfig::default(), vec![margin()])
            .with_oracle(Arc::new(TemplateOracle::new()))
            .with_audit(Arc::new(audit.clone()));
        let outcome = p.govern(&PrincipleId::new("safety-margin")).await.unwrap();

        match &outcome {
            GovernanceOutcome::Promoted { version, attempts, mode, .. } => {
                assert_eq!(*version, 1);
                assert_eq!(*attempts, 1);
                assert_eq!(*mode, EnforcementMode::Mandatory);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(p.rule_set().snapshot().len(), 1);
        assert_eq!(audit.reports().len(), 1);
        assert!(!p.is_running(&PrincipleId::new("safety-margin")));

        let engine = p.enforcement_engine().unwrap();
        let decision = engine
            .evaluate_current(&Proposal::new("deploy", json!({"margin": 0.1})))
            .await;
        assert_eq!(decision.verdict, Verdict::Deny);
    }

    #[tokio::test]
    async fn distance_score_follows_reports() {
        let p = pipeline(GovernanceConfig::default(), vec![margin()])
            .with_oracle(Arc::new(TemplateOracle::new()));
        p.govern(&PrincipleId::new("safety-margin")).await.unwrap();
        let transitions = p.principles().distance_transitions(&PrincipleId::new("safety-margin"));
        assert_eq!(transitions.len(), 1);
        assert!(transitions[0].to < 0.2);
    }

    #[tokio::test]
    async fn exhausted_budget_escalates_with_history() {
        let mut config = GovernanceConfig::default();
        config.recovery.retry_budget = 1;
        let p = pipeline(config, vec![margin()]).with_oracle(Arc::new(
            FixtureOracle::new("fixture").with_reply("(rule broken (when", 0.9),
        ));
        let outcome = p.govern(&PrincipleId::new("safety-margin")).await.unwrap();

        let GovernanceOutcome::Escalated { escalation_id, fault, attempts, .. } = outcome else {
            panic!("expected escalation");
        };
        assert_eq!(attempts, 2);
        assert!(matches!(fault, GovernanceFault::RecoveryBudgetExhausted { attempts: 2, .. }));
        let item = p.review_queue().get(&escalation_id).unwrap();
        assert_eq!(item.packet.attempted_rules.len(), 2);
        assert_eq!(item.packet.reports.len(), 2);
        assert!(p.rule_set().snapshot().is_empty());
    }

    #[tokio::test]
    async fn oracle_outage_escalates() {
        let mut config = GovernanceConfig::default();
        config.recovery.retry_budget = 1;
        let p = pipeline(config, vec![margin()]).with_oracle(Arc::new(FailingOracle));
        let outcome = p.govern(&PrincipleId::new("safety-margin")).await.unwrap();
        assert!(matches!(outcome, GovernanceOutcome::Escalated { attempts: 2, .. }));
        assert!(p.rule_set().snapshot().is_empty());
    }

    #[tokio::test]
    async fn approved_escalation_promotes() {
        let mut config = GovernanceConfig::default();
        config.recovery.retry_budget = 1;
        let body = r#"(rule margin (when (< margin 0.5)) (then deny "too strict"))"#;
        let p = pipeline(config, vec![margin()])
            .with_oracle(Arc::new(FixtureOracle::new("fixture").with_reply(body, 0.9)));
        let GovernanceOutcome::Escalated { escalation_id, .. } =
            p.govern(&PrincipleId::new("safety-margin")).await.unwrap()
        else {
            panic!("expected escalation");
        };
        let rule_id = p.review_queue().get(&escalation_id).unwrap().packet.attempted_rules[0].id.clone();
        let promotion = p
            .approve_escalation(&escalation_id, &rule_id, HumanApproval::new("reviewer"))
            .unwrap();
        assert_eq!(promotion.version, 1);
        assert!(p.rule_set().snapshot().get(&rule_id).is_some());
    }

    #[tokio::test]
    async fn semantic_failure_recovers_by_decomposition() {
        let p = pipeline(GovernanceConfig::default(), vec![limits()])
            .with_oracle(Arc::new(PartsOnlyOracle(TemplateOracle::new())));
        let outcome = p.govern(&PrincipleId::new("resource-limits")).await.unwrap();
        assert!(outcome.is_promoted(), "{:?}", outcome);
        assert_eq!(outcome.attempts(), 2);

        let snapshot = p.rule_set().snapshot();
        let rule = snapshot.iter().next().unwrap();
        assert!(rule.body.contains("or"));
        let effectiveness = p.dispatcher().log().effectiveness();
        assert_eq!(effectiveness[0].succeeded, 1);
    }

    #[tokio::test]
    async fn cancel_stops_in_flight_run() {
        let p = Arc::new(
            pipeline(GovernanceConfig::default(), vec![margin()]).with_oracle(Arc::new(
                FixtureOracle::new("slow")
                    .with_reply("(rule x (when (< margin 0.2)) (then deny \"x\"))", 0.9)
                    .with_delay(Duration::from_secs(5)),
            )),
        );
        let id = PrincipleId::new("safety-margin");
        let runner = {
            let p = p.clone();
            let id = id.clone();
            tokio::spawn(async move { p.govern(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(p.is_running(&id));
        p.amend_principle(&id, |pr| pr.description = "keep a margin of 0.25".into())
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, GovernanceOutcome::Cancelled { .. }));
        assert!(p.rule_set().snapshot().is_empty());
    }

    #[tokio::test]
    async fn retire_withdraws_rules() {
        let p = pipeline(GovernanceConfig::default(), vec![margin()])
            .with_oracle(Arc::new(TemplateOracle::new()));
        let id = PrincipleId::new("safety-margin");
        p.govern(&id).await.unwrap();
        let version = p.retire_principle(&id).unwrap();
        assert_eq!(version, 2);
        assert!(p.rule_set().snapshot().is_empty());
        assert!(p.govern(&id).await.is_err());
    }

    #[tokio::test]
    async fn govern_all_runs_every_principle() {
        let p = Arc::new(
            pipeline(GovernanceConfig::default(), vec![margin(), limits()])
                .with_oracle(Arc::new(TemplateOracle::new())),
        );
        let outcomes = p.govern_all().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.as_ref().unwrap().is_promoted()));
        assert_eq!(p.rule_set().snapshot().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_equal_priority_contradiction_admits_only_one() {
        let floor = Principle::new("floor", 5, "deny thin margins")
            .with_scenario(Scenario::new("thin", json!({"margin": 0.1}), Verdict::Deny));
        let express = Principle::new("express", 5, "the fast lane is always permitted")
            .with_scenario(Scenario::new("fast", json!({"lane": "fast"}), Verdict::Allow));
        let p = Arc::new(
            pipeline(GovernanceConfig::default(), vec![floor, express]).with_oracle(Arc::new(
                ByPrincipleOracle(vec![
                    ("floor", r#"(rule floor (when (< margin 0.2)) (then deny "thin margin"))"#),
                    ("express", r#"(rule express (when (== lane "fast")) (then allow "fast lane"))"#),
                ]),
            )),
        );

        let outcomes: Vec<_> = p
            .govern_all()
            .await
            .into_iter()
            .map(|o| o.unwrap())
            .collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_promoted()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, GovernanceOutcome::Escalated { .. })));

        let snapshot = p.rule_set().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.iter().all(|r| r.mode == EnforcementMode::Mandatory));
    }
}
