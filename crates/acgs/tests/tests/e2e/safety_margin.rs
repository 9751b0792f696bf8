//! End-to-end test: a safety-critical principle goes from text to an
//! enforced rule and gates proposals on either side of its threshold.

use std::sync::Arc;

use acgs_kernel::{GovernanceConfig, GovernanceOutcome, GovernancePipeline};
use acgs_store::{ActiveRuleSet, InMemoryAuditSink};
use acgs_synthesis::TemplateOracle;
use acgs_tests::{safety_margin, store_with, MARGIN_FLOOR};
use acgs_types::{PrincipleId, Proposal, TierName, Verdict, VerificationOutcome};
use serde_json::json;

async fn governed() -> (GovernancePipeline, InMemoryAuditSink) {
    let audit = InMemoryAuditSink::new();
    let pipeline = GovernancePipeline::new(
        GovernanceConfig::default(),
        store_with([safety_margin()]),
        ActiveRuleSet::new(),
    )
    .unwrap()
    .with_oracle(Arc::new(TemplateOracle::new()))
    .with_audit(Arc::new(audit.clone()));

    let outcome = pipeline.govern(&PrincipleId::new("safety-margin")).await.unwrap();
    assert!(matches!(outcome, GovernanceOutcome::Promoted { version: 1, .. }));
    (pipeline, audit)
}

#[tokio::test]
async fn promoted_rule_passed_every_tier_and_was_proved() {
    let (_pipeline, audit) = governed().await;
    let reports = audit.reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(report.promotable());
    assert_eq!(report.outcomes.len(), TierName::ALL.len());
    assert!(report.outcome(TierName::Safety).unwrap().mandatory);
    assert_eq!(report.verification(), Some(&VerificationOutcome::Proved));
}

#[tokio::test]
async fn margin_below_floor_is_denied_naming_the_principle() {
    let (pipeline, _audit) = governed().await;
    let engine = pipeline.enforcement_engine().unwrap();

    let decision = engine
        .evaluate_current(&Proposal::new("cand-1", json!({"margin_pct": MARGIN_FLOOR - 1})))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert_eq!(decision.rule_set_version, 1);
    let primary = decision.primary.expect("deny carries a primary violation");
    assert_eq!(primary.principle_id, PrincipleId::new("safety-margin"));
    assert!(primary.describe().contains("safety-margin"));
}

#[tokio::test]
async fn margin_above_floor_is_allowed() {
    let (pipeline, audit) = governed().await;
    let engine = pipeline.enforcement_engine().unwrap();

    let decision = engine
        .evaluate_current(&Proposal::new("cand-2", json!({"margin_pct": MARGIN_FLOOR + 1})))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(decision.violations.is_empty());
    assert!(decision.fail_safe.is_none());
    assert_eq!(audit.decisions().len(), 1);
}

#[tokio::test]
async fn retiring_the_principle_lifts_the_gate() {
    let (pipeline, _audit) = governed().await;
    let engine = pipeline.enforcement_engine().unwrap();
    let thin = Proposal::new("cand-3", json!({"margin_pct": 1}));
    assert_eq!(engine.evaluate_current(&thin).await.verdict, Verdict::Deny);

    pipeline.retire_principle(&PrincipleId::new("safety-margin")).unwrap();
    let after = engine.evaluate_current(&thin).await;
    assert_eq!(after.verdict, Verdict::Allow);
    assert_eq!(after.rule_set_version, 2);
    assert!(!after.cache_hit);
}
