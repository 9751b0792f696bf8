//! End-to-end test: recovery stays inside the retry budget and the next
//! failure escalates to human review.

use std::sync::Arc;

use acgs_kernel::{GovernanceConfig, GovernanceOutcome, GovernancePipeline};
use acgs_recovery::{LogEntry, StrategyFamily, StrategyOutcome};
use acgs_store::{ActiveRuleSet, AuditRecord, InMemoryAuditSink};
use acgs_synthesis::FixtureOracle;
use acgs_tests::{safety_margin, store_with};
use acgs_types::{GovernanceFault, HumanApproval, PrincipleId, PromotionBasis};

const BROKEN: &str = "(rule margin (when (< margin_pct";
const REPAIRED: &str = r#"(rule margin (when (< margin_pct 20)) (then deny "margin below 20 percent"))"#;

fn pipeline(oracle: Arc<FixtureOracle>, audit: &InMemoryAuditSink) -> GovernancePipeline {
    GovernancePipeline::new(
        GovernanceConfig::default(),
        store_with([safety_margin()]),
        ActiveRuleSet::new(),
    )
    .unwrap()
    .with_oracle(oracle)
    .with_audit(Arc::new(audit.clone()))
}

#[tokio::test]
async fn failure_after_the_budget_escalates() {
    let audit = InMemoryAuditSink::new();
    let oracle = Arc::new(FixtureOracle::new("fixture").with_reply(BROKEN, 0.9));
    let p = pipeline(oracle.clone(), &audit);
    let budget = p.config().recovery.retry_budget;

    let outcome = p.govern(&PrincipleId::new("safety-margin")).await.unwrap();
    let GovernanceOutcome::Escalated { escalation_id, fault, attempts, .. } = outcome else {
        panic!("expected escalation");
    };
    assert_eq!(attempts, budget + 1);
    assert_eq!(oracle.calls() as u32, budget + 1);
    assert!(matches!(fault, GovernanceFault::RecoveryBudgetExhausted { .. }));

    let entries = p.dispatcher().log().entries();
    let dispatched = entries
        .iter()
        .filter(|e| matches!(e, LogEntry::Dispatched { .. }))
        .count();
    assert_eq!(dispatched as u32, budget + 1);
    let escalated = entries
        .iter()
        .filter(|e| matches!(e, LogEntry::Resolved { outcome: StrategyOutcome::Escalated, .. }))
        .count();
    assert_eq!(escalated, 1);

    let item = p.review_queue().get(&escalation_id).unwrap();
    assert_eq!(item.packet.reports.len() as u32, budget + 1);
    assert!(item.packet.summary().contains("safety-margin"));
    assert!(p.rule_set().snapshot().is_empty());
    assert!(audit
        .entries()
        .iter()
        .any(|e| matches!(e.record, AuditRecord::Escalation { .. })));
}

#[tokio::test]
async fn template_repair_recovers_within_budget() {
    let audit = InMemoryAuditSink::new();
    let oracle = Arc::new(
        FixtureOracle::new("fixture")
            .with_reply(BROKEN, 0.9)
            .with_reply(REPAIRED, 0.9),
    );
    let p = pipeline(oracle, &audit);

    let outcome = p.govern(&PrincipleId::new("safety-margin")).await.unwrap();
    assert!(outcome.is_promoted(), "{:?}", outcome);
    assert_eq!(outcome.attempts(), 2);

    let effectiveness = p.dispatcher().log().effectiveness();
    let repair = effectiveness
        .iter()
        .find(|s| s.family == StrategyFamily::TemplateRepair)
        .unwrap();
    assert_eq!(repair.succeeded, 1);
    assert!((repair.success_rate() - 1.0).abs() < 1e-9);
    assert_eq!(audit.reports().len(), 2);
}

#[tokio::test]
async fn reviewer_can_approve_an_escalated_rule() {
    let audit = InMemoryAuditSink::new();
    let p = pipeline(Arc::new(FixtureOracle::new("fixture").with_reply(BROKEN, 0.9)), &audit);
    let GovernanceOutcome::Escalated { escalation_id, .. } =
        p.govern(&PrincipleId::new("safety-margin")).await.unwrap()
    else {
        panic!("expected escalation");
    };
    let rule_id = p.review_queue().pending()[0].attempted_rules[0].id.clone();

    // The broken body never compiles, so even a reviewer cannot activate it.
    assert!(p
        .approve_escalation(&escalation_id, &rule_id, HumanApproval::new("dana"))
        .is_err());
    assert!(p.rule_set().snapshot().is_empty());

    let audit = InMemoryAuditSink::new();
    let p = pipeline(
        Arc::new(FixtureOracle::new("fixture").with_reply(
            r#"(rule margin (when (< margin_pct 50)) (then deny "margin below 50 percent"))"#,
            0.9,
        )),
        &audit,
    );
    let GovernanceOutcome::Escalated { escalation_id, .. } =
        p.govern(&PrincipleId::new("safety-margin")).await.unwrap()
    else {
        panic!("expected escalation");
    };
    let rule_id = p.review_queue().pending()[0].attempted_rules[0].id.clone();
    let promotion = p
        .approve_escalation(&escalation_id, &rule_id, HumanApproval::new("dana"))
        .unwrap();
    let snapshot = p.rule_set().snapshot();
    let rule = snapshot.get(&rule_id).unwrap();
    assert_eq!(promotion.version, 1);
    assert!(matches!(&rule.basis, PromotionBasis::HumanApproved(a) if a.approver == "dana"));
}
