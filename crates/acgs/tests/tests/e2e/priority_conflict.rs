//! End-to-end test: rules from priority 9 and priority 3 fire on the same
//! proposal with contradictory verdicts.

use std::sync::Arc;

use acgs_kernel::{GovernanceConfig, GovernanceOutcome, GovernancePipeline};
use acgs_store::{ActiveRuleSet, AuditRecord, InMemoryAuditSink, PrincipleStore};
use acgs_synthesis::{FixtureOracle, TemplateOracle};
use acgs_tests::{fast_lane, risk_limit, store_with, FAST_LANE_RULE};
use acgs_types::{EnforcementMode, PrincipleId, Proposal, Verdict};
use serde_json::json;

struct Governed {
    principles: PrincipleStore,
    rule_set: ActiveRuleSet,
    audit: InMemoryAuditSink,
    risk: GovernancePipeline,
}

/// Two pipelines over the same stores: one synthesizes from templates, the
/// other replays the fast-lane permit.
async fn governed() -> Governed {
    let principles = store_with([risk_limit(), fast_lane()]);
    let rule_set = ActiveRuleSet::new();
    let audit = InMemoryAuditSink::new();

    let risk = GovernancePipeline::new(GovernanceConfig::default(), principles.clone(), rule_set.clone())
        .unwrap()
        .with_oracle(Arc::new(TemplateOracle::new()))
        .with_audit(Arc::new(audit.clone()));
    let lane = GovernancePipeline::new(GovernanceConfig::default(), principles.clone(), rule_set.clone())
        .unwrap()
        .with_oracle(Arc::new(FixtureOracle::new("fixture").with_reply(FAST_LANE_RULE, 0.8)))
        .with_audit(Arc::new(audit.clone()));

    assert!(risk.govern(&PrincipleId::new("risk-limit")).await.unwrap().is_promoted());
    let outcome = lane.govern(&PrincipleId::new("fast-lane")).await.unwrap();
    match outcome {
        GovernanceOutcome::Promoted { mode, version, .. } => {
            assert_eq!(version, 2);
            assert_eq!(mode, EnforcementMode::Advisory);
        }
        other => panic!("unexpected {:?}", other),
    }

    Governed {
        principles,
        rule_set,
        audit,
        risk,
    }
}

#[tokio::test]
async fn validation_resolves_in_favour_of_priority_nine() {
    let g = governed().await;
    let reports = g.audit.reports();
    let lane_report = reports
        .iter()
        .find(|r| r.principle_id == PrincipleId::new("fast-lane"))
        .unwrap();
    assert_eq!(lane_report.conflicts().len(), 1);
    let resolution = &lane_report.resolutions()[0];
    assert_eq!(resolution.demoted, lane_report.rule_id);

    assert_eq!(g.rule_set.snapshot().len(), 2);
    assert_eq!(g.principles.len(), 2);
}

#[tokio::test]
async fn decision_follows_priority_nine_and_logs_the_conflict() {
    let g = governed().await;
    let engine = g.risk.enforcement_engine().unwrap();

    let decision = engine
        .evaluate_current(&Proposal::new("cand-1", json!({"risk": 9, "lane": "fast"})))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);
    let primary = decision.primary.clone().unwrap();
    assert_eq!(primary.priority, 9);
    assert_eq!(primary.principle_id, PrincipleId::new("risk-limit"));
    assert_eq!(decision.conflicts.len(), 1);
    assert_eq!(decision.conflicts[0].winner_priority, 9);
    assert_eq!(decision.conflicts[0].loser_priority, 3);
    assert!(!decision.conflicts[0].permit_won());
    assert_eq!(engine.stats().runtime_conflicts, 1);

    let audited = g
        .audit
        .entries()
        .into_iter()
        .filter(|e| matches!(e.record, AuditRecord::Decision(_)))
        .count();
    assert_eq!(audited, 1);
}

#[tokio::test]
async fn calm_fast_lane_is_allowed() {
    let g = governed().await;
    let engine = g.risk.enforcement_engine().unwrap();
    let decision = engine
        .evaluate_current(&Proposal::new("cand-2", json!({"risk": 1, "lane": "fast"})))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(decision.conflicts.is_empty());
}
