//! End-to-end test: bias risk bands come from configuration.

use std::time::Instant;

use acgs_kernel::GovernanceConfig;
use acgs_store::RuleSetSnapshot;
use acgs_types::{BiasBand, CandidateRule, Principle, Scenario, TierFindings, TierName, Verdict};
use acgs_validator::tiers::bias::classify;
use acgs_validator::{BiasAssessment, BiasConfig, TieredValidator, ValidatorConfig};
use serde_json::json;

const GENDER_GATE: &str =
    r#"(rule loan-gate (when (== applicant.gender "female")) (then deny "applicant screened"))"#;

fn loan_principle() -> Principle {
    Principle::new("loan-screening", 5, "screen loan applicants")
        .with_scenario(Scenario::new(
            "screened",
            json!({"applicant": {"gender": "female"}}),
            Verdict::Deny,
        ))
        .with_scenario(Scenario::new(
            "admitted",
            json!({"applicant": {"gender": "male"}}),
            Verdict::Allow,
        ))
}

fn validator_with(bias: BiasConfig) -> TieredValidator {
    TieredValidator::new(ValidatorConfig {
        bias,
        ..ValidatorConfig::default()
    })
    .unwrap()
}

fn assessment(signal: f64) -> BiasAssessment {
    BiasAssessment {
        counterfactual_rate: signal,
        direction_similarity: signal,
        outcome_disparity: signal,
        protected_fields: vec!["gender".into()],
    }
}

fn band_of(findings: &TierFindings) -> BiasBand {
    match findings {
        TierFindings::Bias { band, .. } => *band,
        other => panic!("unexpected findings {:?}", other),
    }
}

#[test]
fn risk_between_thresholds_recommends_review_without_blocking() {
    let config = BiasConfig::default();
    let a = assessment(0.75);
    assert!((a.risk(&config) - 0.75).abs() < 1e-9);

    let outcome = classify(&a, &config, Instant::now());
    assert_eq!(band_of(&outcome.findings), BiasBand::HumanReviewRecommended);
    assert!(!outcome.passed);
    assert!(!outcome.mandatory);
    assert!(!outcome.blocks_promotion());
}

#[test]
fn low_risk_passes_and_high_risk_blocks() {
    let config = BiasConfig::default();
    let low = classify(&assessment(0.1), &config, Instant::now());
    assert_eq!(band_of(&low.findings), BiasBand::AutoPass);
    assert!(low.passed);

    let high = classify(&assessment(0.95), &config, Instant::now());
    assert_eq!(band_of(&high.findings), BiasBand::HumanReviewRequired);
    assert!(high.blocks_promotion());
}

#[test]
fn strict_preset_moves_the_bands() {
    let strict = GovernanceConfig::strict().validator.bias;
    let outcome = classify(&assessment(0.75), &strict, Instant::now());
    assert_eq!(band_of(&outcome.findings), BiasBand::HumanReviewRequired);
    assert!(outcome.blocks_promotion());
}

#[tokio::test]
async fn validated_rule_on_protected_field_is_promotable_with_review_recommended() {
    // Flip rate and disparity are both 1 for this rule, so risk lands in
    // [0.6, 1.0) whatever the direction signal.
    let bias = BiasConfig {
        advisory_threshold: 0.5,
        required_threshold: 0.99,
        counterfactual_weight: 0.3,
        direction_weight: 0.4,
        disparity_weight: 0.3,
        ..BiasConfig::default()
    };
    let p = loan_principle();
    let candidate = CandidateRule::new(p.id.clone(), GENDER_GATE, "fixture");
    let report = validator_with(bias)
        .validate(&candidate, &p, &RuleSetSnapshot::default())
        .await;

    assert!(report.promotable(), "blocked at {:?}", report.first_blocking());
    assert_eq!(report.bias_band(), Some(BiasBand::HumanReviewRecommended));
    let outcome = report.outcome(TierName::Bias).unwrap();
    assert!(!outcome.passed);
    assert!(!outcome.mandatory);
    match &outcome.findings {
        TierFindings::Bias {
            risk,
            counterfactual_rate,
            ..
        } => {
            assert!(*risk >= 0.5 && *risk < 0.99, "risk {}", risk);
            assert_eq!(*counterfactual_rate, 1.0);
        }
        other => panic!("unexpected findings {:?}", other),
    }
    assert!(report.advisory_failures().any(|o| o.tier == TierName::Bias));
}

#[tokio::test]
async fn default_bands_require_review_for_the_same_rule() {
    let p = loan_principle();
    let candidate = CandidateRule::new(p.id.clone(), GENDER_GATE, "fixture");
    let report = validator_with(BiasConfig::default())
        .validate(&candidate, &p, &RuleSetSnapshot::default())
        .await;

    assert!(!report.promotable());
    assert_eq!(report.bias_band(), Some(BiasBand::HumanReviewRequired));
    assert_eq!(report.first_blocking().map(|o| o.tier), Some(TierName::Bias));
}
