use std::sync::Arc;
use std::time::Duration;

use acgs_policy_lang::{EvalLimits, SearchLimits};
use acgs_store::RuleSetSnapshot;
use acgs_types::{
    CandidateRule, Principle, TierName, TierOutcome, ValidationReport, ValidationStatus,
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ValidatorConfig;
use crate::error::ValidatorError;
use crate::tiers::{bias, conflict, formal, safety, semantic, syntax};
use crate::verifier::{BoundedModelChecker, FormalVerifier};

/// Runs the six tiers in order and stops at the first mandatory failure.
pub struct TieredValidator {
    config: ValidatorConfig,
    verifier: Arc<dyn FormalVerifier>,
}

impl TieredValidator {
    pub fn new(config: ValidatorConfig) -> Result<Self, ValidatorError> {
        config.validate()?;
        let verifier = Arc::new(BoundedModelChecker::new(
            config.search_limit,
            config.eval_step_budget,
        ));
        Ok(Self { config, verifier })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn FormalVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate one candidate against its principle and the rule set it
    /// would join.
    pub async fn validate(
        &self,
        candidate: &CandidateRule,
        principle: &Principle,
        active: &RuleSetSnapshot,
    ) -> ValidationReport {
        let started_at = Utc::now();
        let mut outcomes: Vec<TierOutcome> = Vec::with_capacity(TierName::ALL.len());
        let eval = EvalLimits::new(self.config.eval_step_budget);
        let search = SearchLimits {
            max_assignments: self.config.search_limit,
            deadline: None,
        };

        let (syntax_outcome, compiled) = syntax::check(candidate);
        let proceed = record(&mut outcomes, candidate, syntax_outcome);
        let compiled = match compiled {
            Some(rule) if proceed => Arc::new(rule),
            _ => return self.finish(candidate, principle, active.version, outcomes, started_at),
        };

        let semantic_outcome =
            semantic::check(&compiled, principle, self.config.scenario_threshold, &eval);
        if !record(&mut outcomes, candidate, semantic_outcome) {
            return self.finish(candidate, principle, active.version, outcomes, started_at);
        }

        let safety_outcome = safety::check(&compiled, principle, self.config.max_nesting);
        if !record(&mut outcomes, candidate, safety_outcome) {
            return self.finish(candidate, principle, active.version, outcomes, started_at);
        }

        let bias_outcome = bias::check(&compiled, principle, &self.config.bias, &eval);
        if !record(&mut outcomes, candidate, bias_outcome) {
            return self.finish(candidate, principle, active.version, outcomes, started_at);
        }

        let conflict_outcome = conflict::check(
            conflict::RuleRef {
                id: &candidate.id,
                priority: principle.priority,
                rule: &compiled,
            },
            &principle.id,
            active,
            self.config.auto_resolve_conflicts,
            &search,
            &eval,
        );
        if !record(&mut outcomes, candidate, conflict_outcome) {
            return self.finish(candidate, principle, active.version, outcomes, started_at);
        }

        if principle.formalizability.runs_formal_tier() {
            let formal_outcome = formal::check(
                Arc::clone(&compiled),
                principle,
                self.verifier.as_ref(),
                Duration::from_millis(self.config.formal_timeout_ms),
            )
            .await;
            record(&mut outcomes, candidate, formal_outcome);
        } else {
            debug!(
                rule_id = %candidate.id,
                formalizability = %principle.formalizability,
                "formal tier skipped"
            );
        }

        self.finish(candidate, principle, active.version, outcomes, started_at)
    }

    fn finish(
        &self,
        candidate: &CandidateRule,
        principle: &Principle,
        rule_set_version: u64,
        outcomes: Vec<TierOutcome>,
        started_at: chrono::DateTime<Utc>,
    ) -> ValidationReport {
        let report = ValidationReport {
            id: Uuid::new_v4(),
            principle_id: principle.id.clone(),
            principle_revision: principle.revision,
            rule_id: candidate.id.clone(),
            attempt: candidate.attempt,
            rule_set_version,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };
        match report.first_blocking() {
            None => info!(
                report_id = %report.id,
                rule_id = %report.rule_id,
                tiers = report.outcomes.len(),
                advisory_failures = report.advisory_failures().count(),
                "candidate promotable"
            ),
            Some(blocking) => warn!(
                report_id = %report.id,
                rule_id = %report.rule_id,
                tier = %blocking.tier,
                detail = %blocking.detail,
                "candidate blocked"
            ),
        }
        report
    }
}

/// Append a tier outcome; false when it blocks promotion.
fn record(outcomes: &mut Vec<TierOutcome>, candidate: &CandidateRule, outcome: TierOutcome) -> bool {
    debug!(
        rule_id = %candidate.id,
        tier = %outcome.tier,
        passed = outcome.passed,
        mandatory = outcome.mandatory,
        duration_us = outcome.duration_us,
        "tier finished"
    );
    let proceed = !outcome.blocks_promotion();
    outcomes.push(outcome);
    proceed
}

/// The status a candidate carries after validation.
pub fn status_of(report: &ValidationReport) -> ValidationStatus {
    match report.first_blocking() {
        None => ValidationStatus::Passed,
        Some(o) => ValidationStatus::Failed { tier: o.tier },
    }
}

/// Copy the report's verdict onto the candidate.
pub fn mark(candidate: &mut CandidateRule, report: &ValidationReport) {
    candidate.status = status_of(report);
    candidate.verification = report.verification().cloned();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::StallingVerifier;
    use acgs_store::{ActiveRule, ActiveRuleSet};
    use acgs_types::{Formalizability, PromotionBasis, Scenario, Verdict};
    use serde_json::json;

    const MARGIN_RULE: &str = r#"(rule min-margin (when (< margin 0.2)) (then deny "safety margin below 0.2"))"#;

    fn principle() -> Principle {
        Principle::new("safety-margin", 9, "keep a safety margin of at least 0.2")
            .with_scenario(Scenario::new("below", json!({"margin": 0.1}), Verdict::Deny))
            .with_scenario(Scenario::new("above", json!({"margin": 0.3}), Verdict::Allow))
    }

    fn candidate(body: &str) -> CandidateRule {
        CandidateRule::new(principle().id, body, "fixture")
    }

    fn validator() -> TieredValidator {
        TieredValidator::new(ValidatorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn good_rule_runs_every_tier_and_is_promotable() {
        let p = principle()
            .with_formalizability(Formalizability::FormallyVerifiable)
            .with_formal_spec("(< margin 0.2)");
        let report = validator()
            .validate(&candidate(MARGIN_RULE), &p, &RuleSetSnapshot::default())
            .await;
        assert!(report.promotable());
        let tiers: Vec<TierName> = report.outcomes.iter().map(|o| o.tier).collect();
        assert_eq!(tiers, TierName::ALL.to_vec());
        assert_eq!(report.verification(), Some(&acgs_types::VerificationOutcome::Proved));
    }

    #[tokio::test]
    async fn heuristic_principle_skips_formal_tier() {
        let report = validator()
            .validate(&candidate(MARGIN_RULE), &principle(), &RuleSetSnapshot::default())
            .await;
        assert!(report.promotable());
        assert!(report.outcome(TierName::Formal).is_none());
        assert_eq!(report.outcomes.len(), 5);
    }

    #[tokio::test]
    async fn syntax_failure_short_circuits() {
        let report = validator()
            .validate(&candidate("(rule broken"), &principle(), &RuleSetSnapshot::default())
            .await;
        assert!(!report.promotable());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(status_of(&report), ValidationStatus::Failed { tier: TierName::Syntax });
    }

    #[tokio::test]
    async fn semantic_failure_stops_before_safety() {
        let body = r#"(rule loose (when (< margin 0.05)) (then deny "tiny margin"))"#;
        let report = validator()
            .validate(&candidate(body), &principle(), &RuleSetSnapshot::default())
            .await;
        assert_eq!(report.first_blocking().map(|o| o.tier), Some(TierName::Semantic));
        assert!(report.outcome(TierName::Safety).is_none());
    }

    #[tokio::test]
    async fn advisory_safety_finding_does_not_block() {
        let body = r#"(rule m (when (and (< margin 0.2) (not (matches tag "*")))) (then deny "low"))"#;
        let report = validator()
            .validate(&candidate(body), &principle(), &RuleSetSnapshot::default())
            .await;
        assert!(report.promotable());
        assert_eq!(report.advisory_failures().count(), 1);

        let critical = principle().safety_critical();
        let report = validator()
            .validate(&candidate(body), &critical, &RuleSetSnapshot::default())
            .await;
        assert_eq!(report.first_blocking().map(|o| o.tier), Some(TierName::Safety));
    }

    #[tokio::test]
    async fn conflict_with_active_rule_is_resolved_by_priority() {
        let other = Principle::new("throughput", 3, "fast lane")
            .with_scenario(Scenario::new("fast", json!({"lane": "fast"}), Verdict::Allow));
        let body = r#"(rule fast (when (== lane "fast")) (then allow "fast lane"))"#;
        let c = CandidateRule::new(other.id.clone(), body, "fixture");
        let set = ActiveRuleSet::new();
        set.promote(
            ActiveRule::from_candidate(&c, &other, PromotionBasis::Validated { report_id: Uuid::new_v4() })
                .unwrap(),
        );

        let report = validator()
            .validate(&candidate(MARGIN_RULE), &principle(), &set.snapshot())
            .await;
        assert!(report.promotable());
        assert_eq!(report.conflicts().len(), 1);
        assert_eq!(report.resolutions()[0].demoted, c.id);
    }

    #[tokio::test(start_paused = true)]
    async fn formal_timeout_keeps_rule_promotable() {
        let p = principle()
            .with_formalizability(Formalizability::FormallyVerifiable)
            .with_formal_spec("(< margin 0.2)");
        let v = validator().with_verifier(Arc::new(StallingVerifier));
        let report = v
            .validate(&candidate(MARGIN_RULE), &p, &RuleSetSnapshot::default())
            .await;
        assert!(report.promotable());
        assert!(matches!(
            report.verification(),
            Some(acgs_types::VerificationOutcome::Inapplicable { .. })
        ));
    }

    #[test]
    fn mark_copies_status() {
        let report = ValidationReport {
            id: Uuid::new_v4(),
            principle_id: principle().id,
            principle_revision: 1,
            rule_id: candidate(MARGIN_RULE).id,
            attempt: 1,
            rule_set_version: 0,
            outcomes: vec![],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let mut c = candidate(MARGIN_RULE);
        mark(&mut c, &report);
        assert_eq!(c.status, ValidationStatus::Passed);
        assert!(c.verification.is_none());
    }
}
