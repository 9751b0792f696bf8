//! Admission of validated (or human-approved) candidates into the Active
//! Rule Set.
//!
//! Everything happens inside one rule-set write transaction: the principle
//! revision is re-checked under the writer lock, rules admitted since the
//! report's rule-set version are checked for conflicts, resolutions are
//! applied, and the next version is published with a single swap.

use acgs_policy_lang::{EvalLimits, SearchLimits};
use acgs_store::{
    ActiveRule, ActiveRuleSet, AuditRecord, AuditSink, PrincipleStore, RuleSetSnapshot, StoreError,
};
use acgs_types::{
    CandidateRule, ConflictRecord, EnforcementMode, HumanApproval, PromotionBasis, RuleId,
    TierName, ValidationReport,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ValidatorError;
use crate::tiers::conflict::{detect_conflict, RuleRef};

/// What a promotion changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub rule_id: RuleId,
    pub version: u64,
    pub mode: EnforcementMode,
    /// Active rules demoted to advisory in the same transaction.
    pub demoted: Vec<RuleId>,
}

/// Promote a candidate whose report is promotable.
pub fn promote(
    report: &ValidationReport,
    candidate: &CandidateRule,
    principles: &PrincipleStore,
    rule_set: &ActiveRuleSet,
    audit: &dyn AuditSink,
) -> Result<Promotion, ValidatorError> {
    if report.rule_id != candidate.id {
        return Err(ValidatorError::ReportMismatch {
            report_rule: report.rule_id.clone(),
            candidate: candidate.id.clone(),
        });
    }
    if !report.promotable() {
        return Err(ValidatorError::NotPromotable {
            rule_id: candidate.id.clone(),
            tier: report
                .first_blocking()
                .map(|o| o.tier)
                .unwrap_or(TierName::Syntax),
        });
    }

    let mut writer = rule_set.begin_write();
    let principle = principles.get(&report.principle_id)?;
    if !principle.is_active() {
        return Err(StoreError::PrincipleRetired(principle.id).into());
    }
    if principle.revision != report.principle_revision {
        return Err(StoreError::StaleRevision {
            principle_id: principle.id,
            expected: report.principle_revision,
            current: principle.revision,
        }
        .into());
    }

    let rule = ActiveRule::from_candidate(
        candidate,
        &principle,
        PromotionBasis::Validated {
            report_id: report.id,
        },
    )?;
    let current = writer.staged().version;
    if current != report.rule_set_version {
        if let Some(record) = unseen_conflict(report, &rule, writer.staged()) {
            let conflicting = record
                .other(&candidate.id)
                .cloned()
                .unwrap_or(record.second);
            warn!(
                rule_id = %candidate.id,
                validated = report.rule_set_version,
                current,
                conflicting = %conflicting,
                "rule set changed since validation"
            );
            return Err(ValidatorError::StaleRuleSet {
                rule_id: candidate.id.clone(),
                validated: report.rule_set_version,
                current,
                conflicting,
            });
        }
    }

    let mut mode = EnforcementMode::Mandatory;
    let mut demoted = Vec::new();
    let mut demotions = Vec::new();
    for resolution in report.resolutions() {
        if resolution.demoted == candidate.id {
            mode = EnforcementMode::Advisory;
            continue;
        }
        match writer.demote(&resolution.demoted, &resolution.winner) {
            Ok(()) => {
                demoted.push(resolution.demoted.clone());
                demotions.push(resolution.clone());
            }
            Err(StoreError::RuleNotFound(id)) => {
                warn!(rule_id = %id, "conflicting rule left the set before promotion");
            }
            Err(e) => return Err(e.into()),
        }
    }

    writer.promote(rule.with_mode(mode));
    let version = writer.commit();

    info!(
        rule_id = %candidate.id,
        principle_id = %principle.id,
        version,
        %mode,
        demoted = demoted.len(),
        "rule promoted"
    );
    audit.record(AuditRecord::Promotion {
        rule_id: candidate.id.clone(),
        principle_id: principle.id.clone(),
        version,
        approver: None,
    });
    for d in demotions {
        audit.record(AuditRecord::Demotion {
            rule_id: d.demoted,
            winner: d.winner,
            version,
        });
    }

    Ok(Promotion {
        rule_id: candidate.id.clone(),
        version,
        mode,
        demoted,
    })
}

/// First conflict with an active rule of another principle that the report
/// never checked.
fn unseen_conflict(
    report: &ValidationReport,
    rule: &ActiveRule,
    staged: &RuleSetSnapshot,
) -> Option<ConflictRecord> {
    let seen = report.conflicts();
    let ours = RuleRef {
        id: &rule.id,
        priority: rule.priority,
        rule: &rule.compiled,
    };
    staged
        .iter()
        .filter(|other| other.principle_id != rule.principle_id && other.id != rule.id)
        .filter(|other| !seen.iter().any(|c| c.involves(&other.id)))
        .find_map(|other| {
            let theirs = RuleRef {
                id: &other.id,
                priority: other.priority,
                rule: &other.compiled,
            };
            detect_conflict(ours, theirs, &SearchLimits::default(), &EvalLimits::default())
        })
}

/// Promote on recorded human sign-off, bypassing failed tiers. The body must
/// still compile.
pub fn promote_with_approval(
    candidate: &CandidateRule,
    approval: HumanApproval,
    principles: &PrincipleStore,
    rule_set: &ActiveRuleSet,
    audit: &dyn AuditSink,
) -> Result<Promotion, ValidatorError> {
    let mut writer = rule_set.begin_write();
    let principle = principles.get(&candidate.principle_id)?;
    if !principle.is_active() {
        return Err(StoreError::PrincipleRetired(principle.id).into());
    }
    let approver = approval.approver.clone();
    let rule = ActiveRule::from_candidate(candidate, &principle, PromotionBasis::HumanApproved(approval))?;
    writer.promote(rule);
    let version = writer.commit();

    info!(
        rule_id = %candidate.id,
        principle_id = %principle.id,
        version,
        approver = %approver,
        "rule promoted on human approval"
    );
    audit.record(AuditRecord::Promotion {
        rule_id: candidate.id.clone(),
        principle_id: principle.id,
        version,
        approver: Some(approver),
    });
    Ok(Promotion {
        rule_id: candidate.id.clone(),
        version,
        mode: EnforcementMode::Mandatory,
        demoted: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TieredValidator, ValidatorConfig};
    use acgs_store::InMemoryAuditSink;
    use acgs_types::{Principle, Scenario, Verdict};
    use serde_json::json;

    const MARGIN_RULE: &str = r#"(rule min-margin (when (< margin 0.2)) (then deny "margin below 0.2"))"#;
    const FAST_RULE: &str = r#"(rule fast (when (== lane "fast")) (then allow "fast lane"))"#;

    fn margin() -> Principle {
        Principle::new("safety-margin", 9, "margin")
            .with_scenario(Scenario::new("below", json!({"margin": 0.1}), Verdict::Deny))
            .with_scenario(Scenario::new("above", json!({"margin": 0.3}), Verdict::Allow))
    }

    fn fast() -> Principle {
        Principle::new("throughput", 3, "fast lane")
            .with_scenario(Scenario::new("fast", json!({"lane": "fast"}), Verdict::Allow))
            .with_scenario(Scenario::new("slow", json!({"lane": "slow"}), Verdict::Allow))
    }

    struct Fixture {
        principles: PrincipleStore,
        set: ActiveRuleSet,
        audit: InMemoryAuditSink,
        validator: TieredValidator,
    }

    fn fixture() -> Fixture {
        let principles = PrincipleStore::new();
        principles.insert(margin()).unwrap();
        principles.insert(fast()).unwrap();
        Fixture {
            principles,
            set: ActiveRuleSet::new(),
            audit: InMemoryAuditSink::new(),
            validator: TieredValidator::new(ValidatorConfig::default()).unwrap(),
        }
    }

    async fn validate_and_promote(f: &Fixture, principle: &str, body: &str) -> Result<Promotion, ValidatorError> {
        let p = f.principles.get(&acgs_types::PrincipleId::new(principle)).unwrap();
        let c = CandidateRule::new(p.id.clone(), body, "fixture");
        let report = f.validator.validate(&c, &p, &f.set.snapshot()).await;
        promote(&report, &c, &f.principles, &f.set, &f.audit)
    }

    #[tokio::test]
    async fn promotion_bumps_version_and_audits() {
        let f = fixture();
        let promotion = validate_and_promote(&f, "safety-margin", MARGIN_RULE).await.unwrap();
        assert_eq!(promotion.version, 1);
        assert_eq!(promotion.mode, EnforcementMode::Mandatory);
        assert_eq!(f.set.snapshot().len(), 1);
        assert!(f.audit.entries().iter().any(|e| matches!(e.record, AuditRecord::Promotion { .. })));
    }

    #[tokio::test]
    async fn higher_priority_newcomer_demotes_incumbent() {
        let f = fixture();
        let first = validate_and_promote(&f, "throughput", FAST_RULE).await.unwrap();
        let second = validate_and_promote(&f, "safety-margin", MARGIN_RULE).await.unwrap();
        assert_eq!(second.demoted, vec![first.rule_id.clone()]);
        let snap = f.set.snapshot();
        assert_eq!(snap.get(&first.rule_id).unwrap().mode, EnforcementMode::Advisory);
        assert_eq!(snap.get(&second.rule_id).unwrap().mode, EnforcementMode::Mandatory);
        assert!(f.audit.entries().iter().any(|e| matches!(e.record, AuditRecord::Demotion { .. })));
    }

    #[tokio::test]
    async fn lower_priority_newcomer_is_admitted_as_advisory() {
        let f = fixture();
        validate_and_promote(&f, "safety-margin", MARGIN_RULE).await.unwrap();
        let p = validate_and_promote(&f, "throughput", FAST_RULE).await.unwrap();
        assert_eq!(p.mode, EnforcementMode::Advisory);
        assert!(p.demoted.is_empty());
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let f = fixture();
        let p = f.principles.get(&acgs_types::PrincipleId::new("safety-margin")).unwrap();
        let c = CandidateRule::new(p.id.clone(), MARGIN_RULE, "fixture");
        let report = f.validator.validate(&c, &p, &f.set.snapshot()).await;
        f.principles
            .amend(&p.id, |p| p.description = "amended".into())
            .unwrap();
        let err = promote(&report, &c, &f.principles, &f.set, &f.audit).unwrap_err();
        assert!(matches!(err, ValidatorError::Store(StoreError::StaleRevision { .. })));
        assert_eq!(f.set.version(), 0);
    }

    #[tokio::test]
    async fn blocked_report_is_not_promotable() {
        let f = fixture();
        let err = validate_and_promote(&f, "safety-margin", "(rule nope").await.unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::NotPromotable {
                tier: TierName::Syntax,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn equal_priority_contradiction_admitted_since_validation_is_refused() {
        let f = fixture();
        f.principles.insert(Principle::new("floor", 5, "floor").with_scenario(Scenario::new(
            "low",
            json!({"margin": 0.1}),
            Verdict::Deny,
        ))).unwrap();
        f.principles.insert(Principle::new("express", 5, "express").with_scenario(Scenario::new(
            "fast",
            json!({"lane": "fast"}),
            Verdict::Allow,
        ))).unwrap();
        let floor = f.principles.get(&acgs_types::PrincipleId::new("floor")).unwrap();
        let express = f.principles.get(&acgs_types::PrincipleId::new("express")).unwrap();
        let a = CandidateRule::new(floor.id.clone(), MARGIN_RULE, "fixture");
        let b = CandidateRule::new(express.id.clone(), FAST_RULE, "fixture");

        let base = f.set.snapshot();
        let (ra, rb) = tokio::join!(
            f.validator.validate(&a, &floor, &base),
            f.validator.validate(&b, &express, &base)
        );
        assert!(ra.promotable() && rb.promotable());
        assert_eq!(rb.rule_set_version, 0);

        let first = promote(&ra, &a, &f.principles, &f.set, &f.audit).unwrap();
        assert_eq!(first.mode, EnforcementMode::Mandatory);
        let err = promote(&rb, &b, &f.principles, &f.set, &f.audit).unwrap_err();
        match err {
            ValidatorError::StaleRuleSet {
                validated,
                current,
                conflicting,
                ..
            } => {
                assert_eq!((validated, current), (0, 1));
                assert_eq!(conflicting, a.id);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(f.set.snapshot().len(), 1);
        assert_eq!(f.set.version(), 1);

        let again = f.validator.validate(&b, &express, &f.set.snapshot()).await;
        assert_eq!(again.rule_set_version, 1);
        assert_eq!(again.first_blocking().map(|o| o.tier), Some(TierName::Conflict));
    }

    #[tokio::test]
    async fn unrelated_admission_since_validation_does_not_block() {
        let f = fixture();
        let margin = f.principles.get(&acgs_types::PrincipleId::new("safety-margin")).unwrap();
        let c = CandidateRule::new(margin.id.clone(), MARGIN_RULE, "fixture");
        let report = f.validator.validate(&c, &margin, &f.set.snapshot()).await;

        let other = Principle::new("audit-trail", 4, "deny unsigned");
        let unsigned = CandidateRule::new(
            other.id.clone(),
            r#"(rule unsigned (when (not (exists signature))) (then deny "unsigned"))"#,
            "fixture",
        );
        f.set.promote(
            ActiveRule::from_candidate(&unsigned, &other, PromotionBasis::HumanApproved(HumanApproval::new("ops")))
                .unwrap(),
        );

        let promotion = promote(&report, &c, &f.principles, &f.set, &f.audit).unwrap();
        assert_eq!(promotion.version, 2);
        assert_eq!(f.set.snapshot().len(), 2);
    }

    #[test]
    fn human_approval_records_approver() {
        let f = fixture();
        let c = CandidateRule::new(margin().id, MARGIN_RULE, "fixture");
        let p = promote_with_approval(
            &c,
            HumanApproval::new("reviewer@example.org"),
            &f.principles,
            &f.set,
            &f.audit,
        )
        .unwrap();
        assert_eq!(p.version, 1);
        let rule = f.set.snapshot().get(&c.id).cloned().unwrap();
        assert!(matches!(rule.basis, PromotionBasis::HumanApproved(ref a) if a.approver == "reviewer@example.org"));
        assert!(f.audit.entries().iter().any(|e| matches!(
            &e.record,
            AuditRecord::Promotion { approver: Some(a), .. } if a == "reviewer@example.org"
        )));
    }
}
