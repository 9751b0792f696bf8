//! End-to-end test: an evaluation that overruns the latency ceiling is
//! denied, never silently allowed.

use std::sync::Arc;
use std::time::Duration;

use acgs_enforcement::{DelayedEvaluator, EnforcementConfig, PgcEngine};
use acgs_store::{ActiveRule, ActiveRuleSet, InMemoryAuditSink};
use acgs_tests::fast_lane;
use acgs_types::{CandidateRule, FailSafeReason, HumanApproval, PromotionBasis, Proposal, Verdict};
use serde_json::json;

fn permit_set() -> (ActiveRuleSet, ActiveRule) {
    let principle = fast_lane();
    let candidate = CandidateRule::new(principle.id.clone(), acgs_tests::FAST_LANE_RULE, "fixture");
    let rule = ActiveRule::from_candidate(
        &candidate,
        &principle,
        PromotionBasis::HumanApproved(HumanApproval::new("test")),
    )
    .unwrap();
    let set = ActiveRuleSet::new();
    set.promote(rule.clone());
    (set, rule)
}

#[tokio::test]
async fn slow_rule_produces_fail_safe_deny() {
    let (set, rule) = permit_set();
    let audit = InMemoryAuditSink::new();
    let engine = PgcEngine::new(set, EnforcementConfig::default().with_latency_ceiling_ms(20))
        .unwrap()
        .with_evaluator(Arc::new(DelayedEvaluator::for_rules(
            Duration::from_millis(250),
            [rule.id.clone()],
        )))
        .with_audit(Arc::new(audit.clone()));

    // Every rule that could fire is a permit; only the overrun can deny.
    let proposal = Proposal::new("p-1", json!({"lane": "fast"}));
    let decision = engine.evaluate_current(&proposal).await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert_eq!(decision.fail_safe, Some(FailSafeReason::Timeout { ceiling_ms: 20 }));
    assert!(engine.cache().is_empty());

    let stats = engine.stats();
    assert_eq!(stats.fail_safes, 1);
    assert_eq!(stats.denied, 1);
    assert_eq!(audit.decisions().len(), 1);
}

#[tokio::test]
async fn fast_rule_within_ceiling_is_decided_normally() {
    let (set, _rule) = permit_set();
    let engine = PgcEngine::new(set, EnforcementConfig::default().with_latency_ceiling_ms(20))
        .unwrap()
        .with_evaluator(Arc::new(DelayedEvaluator::new(Duration::from_millis(1))));

    let decision = engine
        .evaluate_current(&Proposal::new("p-2", json!({"lane": "fast"})))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(decision.fail_safe.is_none());
    assert_eq!(engine.cache().len(), 1);
}
