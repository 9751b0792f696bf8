//! Bias tier.
//!
//! Risk is a weighted blend of three signals:
//!
//! - counterfactual flip rate: how often changing only a protected attribute
//!   changes whether the rule fires
//! - direction similarity: cosine similarity between the rule's vocabulary
//!   and a protected-term lexicon, over hashed bag-of-words vectors
//! - outcome disparity: spread of fire rates across groups of a seeded
//!   synthetic population

use std::time::Instant;

use acgs_policy_lang::{set_path, CompiledRule, Domain, EvalLimits, Path};
use acgs_types::{BiasBand, Principle, TierFindings, TierName, TierOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use super::outcome;
use crate::config::BiasConfig;

const EMBEDDING_DIMS: usize = 64;

const LEXICON_EXTRA: &[&str] = &[
    "male", "female", "men", "women", "young", "old", "elderly", "minority", "foreign",
    "immigrant", "religious", "disabled", "black", "white", "asian", "hispanic",
];

/// Raw bias signals for one rule.
#[derive(Clone, Debug, PartialEq)]
pub struct BiasAssessment {
    pub counterfactual_rate: f64,
    pub direction_similarity: f64,
    pub outcome_disparity: f64,
    pub protected_fields: Vec<String>,
}

impl BiasAssessment {
    pub fn risk(&self, config: &BiasConfig) -> f64 {
        risk_score(
            self.counterfactual_rate,
            self.direction_similarity,
            self.outcome_disparity,
            config,
        )
    }
}

pub fn risk_score(counterfactual: f64, direction: f64, disparity: f64, config: &BiasConfig) -> f64 {
    (config.counterfactual_weight * counterfactual
        + config.direction_weight * direction
        + config.disparity_weight * disparity)
        .clamp(0.0, 1.0)
}

/// Protected fields read by the rule: any path segment naming a protected
/// attribute.
pub fn protected_fields(rule: &CompiledRule, config: &BiasConfig) -> Vec<Path> {
    let mut out: Vec<Path> = rule
        .condition
        .fields()
        .into_iter()
        .filter(|p| !p.is_element())
        .filter(|p| {
            p.0.iter().any(|seg| {
                let seg = seg.to_ascii_lowercase();
                config.protected_attributes.iter().any(|a| *a == seg)
            })
        })
        .cloned()
        .collect();
    out.sort();
    out.dedup();
    out
}

pub fn assess(rule: &CompiledRule, principle: &Principle, config: &BiasConfig, limits: &EvalLimits) -> BiasAssessment {
    let direction_similarity = direction_similarity(&rule.render(), config);
    let protected = protected_fields(rule, config);
    let protected_names = protected.iter().map(Path::to_string).collect();
    if protected.is_empty() {
        return BiasAssessment {
            counterfactual_rate: 0.0,
            direction_similarity,
            outcome_disparity: 0.0,
            protected_fields: protected_names,
        };
    }

    let domain = Domain::for_exprs([&rule.condition]);
    let groups: Vec<Vec<Value>> = protected.iter().map(|p| group_values(&domain, p)).collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let size = domain.size().max(1);
    let population: Vec<Value> = (0..config.population_per_group.max(1))
        .map(|_| domain.assignment(rng.gen_range(0..size)))
        .collect();

    let fires = |input: &Value| rule.fires(input, limits).unwrap_or(false);

    let mut bases: Vec<Value> = principle.scenarios.iter().map(|s| s.input()).collect();
    bases.extend(population.iter().cloned());
    let flipped = bases
        .iter()
        .filter(|base| {
            protected.iter().zip(&groups).any(|(path, values)| {
                let mut outcomes = values.iter().map(|v| {
                    let mut input = (*base).clone();
                    set_path(&mut input, &path.0, v.clone());
                    fires(&input)
                });
                let first = outcomes.next();
                outcomes.any(|o| Some(o) != first)
            })
        })
        .count();
    let counterfactual_rate = flipped as f64 / bases.len().max(1) as f64;

    let mut outcome_disparity: f64 = 0.0;
    for (path, values) in protected.iter().zip(&groups) {
        let rates: Vec<f64> = values
            .iter()
            .map(|v| {
                let hits = population
                    .iter()
                    .filter(|base| {
                        let mut input = (*base).clone();
                        set_path(&mut input, &path.0, v.clone());
                        fires(&input)
                    })
                    .count();
                hits as f64 / population.len() as f64
            })
            .collect();
        let max = rates.iter().cloned().fold(f64::MIN, f64::max);
        let min = rates.iter().cloned().fold(f64::MAX, f64::min);
        outcome_disparity = outcome_disparity.max(max - min);
    }

    BiasAssessment {
        counterfactual_rate,
        direction_similarity,
        outcome_disparity,
        protected_fields: protected_names,
    }
}

fn group_values(domain: &Domain, path: &Path) -> Vec<Value> {
    let mut values: Vec<Value> = domain
        .candidates(&path.0)
        .unwrap_or_default()
        .iter()
        .flatten()
        .cloned()
        .collect();
    if values.len() < 2 {
        for synthetic in ["group_a", "group_b"] {
            values.push(Value::String(synthetic.into()));
        }
    }
    values
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn embed<'a>(words: impl Iterator<Item = &'a str>) -> [f64; EMBEDDING_DIMS] {
    let mut v = [0.0; EMBEDDING_DIMS];
    for word in words {
        let hash = blake3::hash(word.as_bytes());
        let bucket = u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap_or([0; 8]));
        v[(bucket % EMBEDDING_DIMS as u64) as usize] += 1.0;
    }
    v
}

fn cosine(a: &[f64; EMBEDDING_DIMS], b: &[f64; EMBEDDING_DIMS]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)).clamp(0.0, 1.0)
    }
}

/// Similarity of `text` to the protected-term lexicon, in [0, 1].
pub fn direction_similarity(text: &str, config: &BiasConfig) -> f64 {
    let words: Vec<String> = tokens(text).collect();
    let rule_vec = embed(words.iter().map(String::as_str));
    let lexicon = embed(
        config
            .protected_attributes
            .iter()
            .map(String::as_str)
            .chain(LEXICON_EXTRA.iter().copied()),
    );
    cosine(&rule_vec, &lexicon)
}

/// Turn an assessment into a tier outcome. Only the required band is
/// mandatory.
pub fn classify(assessment: &BiasAssessment, config: &BiasConfig, started: Instant) -> TierOutcome {
    let risk = assessment.risk(config);
    let band = BiasBand::classify(risk, config.advisory_threshold, config.required_threshold);
    let detail = match band {
        BiasBand::AutoPass => format!("bias risk {:.3} below review threshold", risk),
        BiasBand::HumanReviewRecommended => {
            format!("bias risk {:.3}: human review recommended", risk)
        }
        BiasBand::HumanReviewRequired => format!("bias risk {:.3}: human review required", risk),
    };
    outcome(
        TierName::Bias,
        band == BiasBand::AutoPass,
        band == BiasBand::HumanReviewRequired,
        detail,
        started,
        TierFindings::Bias {
            risk,
            band,
            counterfactual_rate: assessment.counterfactual_rate,
            direction_similarity: assessment.direction_similarity,
            outcome_disparity: assessment.outcome_disparity,
        },
    )
}

pub fn check(
    rule: &CompiledRule,
    principle: &Principle,
    config: &BiasConfig,
    limits: &EvalLimits,
) -> TierOutcome {
    let started = Instant::now();
    let assessment = assess(rule, principle, config, limits);
    classify(&assessment, config, started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acgs_policy_lang::compile_rule;

    fn assessment(risk_parts: (f64, f64, f64)) -> BiasAssessment {
        BiasAssessment {
            counterfactual_rate: risk_parts.0,
            direction_similarity: risk_parts.1,
            outcome_disparity: risk_parts.2,
            protected_fields: Vec::new(),
        }
    }

    #[test]
    fn neutral_rule_auto_passes() {
        let rule = compile_rule(r#"(rule r (when (< margin 0.2)) (then deny "low margin"))"#).unwrap();
        let p = Principle::new("p", 5, "margin");
        let o = check(&rule, &p, &BiasConfig::default(), &EvalLimits::default());
        assert!(o.passed);
        match o.findings {
            TierFindings::Bias {
                counterfactual_rate,
                outcome_disparity,
                band,
                ..
            } => {
                assert_eq!(counterfactual_rate, 0.0);
                assert_eq!(outcome_disparity, 0.0);
                assert_eq!(band, BiasBand::AutoPass);
            }
            other => panic!("unexpected findings {:?}", other),
        }
    }

    #[test]
    fn rule_keyed_on_protected_attribute_scores_high() {
        let rule = compile_rule(
            r#"(rule r (when (== applicant.gender "female")) (then deny "gender"))"#,
        )
        .unwrap();
        let p = Principle::new("p", 5, "loans");
        let config = BiasConfig::default();
        let a = assess(&rule, &p, &config, &EvalLimits::default());
        assert_eq!(a.protected_fields, vec!["applicant.gender".to_string()]);
        assert_eq!(a.counterfactual_rate, 1.0);
        assert!(a.outcome_disparity > 0.99);
        assert!(a.risk(&config) >= config.advisory_threshold);
    }

    #[test]
    fn assessment_is_deterministic() {
        let rule = compile_rule(
            r#"(rule r (when (and (> age 60) (< income 100))) (then deny "age"))"#,
        )
        .unwrap();
        let p = Principle::new("p", 5, "loans");
        let config = BiasConfig::default();
        let a = assess(&rule, &p, &config, &EvalLimits::default());
        let b = assess(&rule, &p, &config, &EvalLimits::default());
        assert_eq!(a, b);
    }

    #[test]
    fn bands_follow_thresholds() {
        let config = BiasConfig::default();
        // 0.4 * 1.0 + 0.2 * 0.75 + 0.4 * 0.5 = 0.75
        let recommended = classify(&assessment((1.0, 0.75, 0.5)), &config, Instant::now());
        assert!(!recommended.passed);
        assert!(!recommended.mandatory);
        assert!(!recommended.blocks_promotion());

        let required = classify(&assessment((1.0, 1.0, 1.0)), &config, Instant::now());
        assert!(required.blocks_promotion());

        let pass = classify(&assessment((0.0, 0.1, 0.0)), &config, Instant::now());
        assert!(pass.passed);
    }

    #[test]
    fn direction_similarity_bounds() {
        let config = BiasConfig::default();
        let lexicon: Vec<&str> = config
            .protected_attributes
            .iter()
            .map(String::as_str)
            .chain(LEXICON_EXTRA.iter().copied())
            .collect();
        let full = direction_similarity(&lexicon.join(" "), &config);
        assert!((full - 1.0).abs() < 1e-9);
        assert_eq!(direction_similarity("", &config), 0.0);
    }
}
