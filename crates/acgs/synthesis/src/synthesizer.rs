use std::sync::Arc;
use std::time::Duration;

use acgs_policy_lang::compile_rule;
use acgs_types::{CandidateRule, Principle, PrincipleId};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::SynthesisContext;
use crate::error::SynthesisError;
use crate::oracle::{OracleRequest, OracleResponse, RuleOracle};
use crate::prompt::SynthesisPromptBuilder;

/// Oracle-call policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Per-call timeout.
    pub oracle_timeout_ms: u64,
    /// Extra calls after a failed or timed-out call, per oracle.
    pub oracle_retries: u32,
    /// Candidates below this confidence are dropped.
    pub min_confidence: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_ms: 10_000,
            oracle_retries: 2,
            min_confidence: 0.0,
        }
    }
}

/// Produces candidate rules for a principle from one or more oracles.
pub struct RuleSynthesizer {
    oracles: Vec<Arc<dyn RuleOracle>>,
    config: SynthesisConfig,
    attempts: DashMap<PrincipleId, u32>,
}

impl RuleSynthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            oracles: Vec::new(),
            config,
            attempts: DashMap::new(),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn RuleOracle>) -> Self {
        self.oracles.push(oracle);
        self
    }

    pub fn oracle_count(&self) -> usize {
        self.oracles.len()
    }

    /// Attempts made so far for a principle.
    pub fn attempts(&self, principle: &PrincipleId) -> u32 {
        self.attempts.get(principle).map(|a| *a).unwrap_or(0)
    }

    /// Reset the attempt counter, e.g. after an amendment.
    pub fn reset_attempts(&self, principle: &PrincipleId) {
        self.attempts.remove(principle);
    }

    fn next_attempt(&self, principle: &PrincipleId) -> u32 {
        let mut entry = self.attempts.entry(principle.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Ask every oracle, in parallel, for a rule implementing `principle`.
    ///
    /// Malformed replies are returned as candidates carrying a synthesis
    /// issue so the validator can classify them. Fails only when no oracle
    /// replied at all.
    pub async fn synthesize(
        &self,
        principle: &Principle,
        context: &SynthesisContext,
    ) -> Result<Vec<CandidateRule>, SynthesisError> {
        validate_principle(principle)?;
        if self.oracles.is_empty() {
            return Err(SynthesisError::OracleUnavailable("no oracle configured".into()));
        }

        let attempt = self.next_attempt(&principle.id);
        let request = OracleRequest {
            principle: principle.clone(),
            context: context.clone(),
            prompt: SynthesisPromptBuilder::build(principle, context),
            attempt,
        };
        info!(
            principle_id = %principle.id,
            attempt,
            oracles = self.oracles.len(),
            "synthesis started"
        );

        let calls = self
            .oracles
            .iter()
            .map(|oracle| self.call_with_retries(oracle.as_ref(), &request));
        let results = join_all(calls).await;

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for (oracle, result) in self.oracles.iter().zip(results) {
            match result {
                Ok(response) => {
                    if response.confidence < self.config.min_confidence {
                        warn!(
                            oracle = oracle.id(),
                            confidence = response.confidence,
                            "candidate below confidence floor dropped"
                        );
                        continue;
                    }
                    candidates.push(to_candidate(principle, oracle.id(), attempt, response));
                }
                Err(e) => failures.push(e.to_string()),
            }
        }

        if candidates.is_empty() {
            let detail = if failures.is_empty() {
                "every candidate fell below the confidence floor".to_string()
            } else {
                failures.join("; ")
            };
            warn!(principle_id = %principle.id, attempt, %detail, "oracles unavailable");
            return Err(SynthesisError::OracleUnavailable(detail));
        }

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        info!(
            principle_id = %principle.id,
            attempt,
            candidates = candidates.len(),
            malformed = candidates.iter().filter(|c| c.is_malformed()).count(),
            "synthesis finished"
        );
        Ok(candidates)
    }

    async fn call_with_retries(
        &self,
        oracle: &dyn RuleOracle,
        request: &OracleRequest,
    ) -> Result<OracleResponse, SynthesisError> {
        let timeout = Duration::from_millis(self.config.oracle_timeout_ms);
        let mut last_error = None;
        for call in 0..=self.config.oracle_retries {
            match tokio::time::timeout(timeout, oracle.propose(request)).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => {
                    warn!(oracle = oracle.id(), call, error = %e, "oracle call failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(oracle = oracle.id(), call, "oracle call timed out");
                    last_error = Some(SynthesisError::OracleTimeout {
                        oracle: oracle.id().to_string(),
                        timeout_ms: self.config.oracle_timeout_ms,
                    });
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SynthesisError::OracleUnavailable(oracle.id().to_string())))
    }
}

impl Default for RuleSynthesizer {
    fn default() -> Self {
        Self::new(SynthesisConfig::default())
    }
}

fn validate_principle(principle: &Principle) -> Result<(), SynthesisError> {
    let reason = if !principle.is_active() {
        Some("principle is retired")
    } else if principle.description.trim().is_empty() {
        Some("empty description")
    } else if principle.scenarios.is_empty() {
        Some("no validation scenarios")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SynthesisError::InvalidPrinciple {
            principle_id: principle.id.clone(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}

/// Strip a surrounding Markdown code fence, if any.
pub fn unwrap_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_open = &trimmed[start + 3..];
    // Skip a language tag on the opening fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim().to_string(),
        None => body.trim().to_string(),
    }
}

fn to_candidate(
    principle: &Principle,
    oracle_id: &str,
    attempt: u32,
    response: OracleResponse,
) -> CandidateRule {
    let body = unwrap_code_fence(&response.rule_text);
    let candidate = CandidateRule::new(principle.id.clone(), body.clone(), oracle_id)
        .with_confidence(response.confidence)
        .with_attempt(attempt);
    if body.is_empty() {
        return candidate.with_issue("empty oracle reply");
    }
    match compile_rule(&body) {
        Ok(_) => candidate,
        Err(e) => {
            warn!(principle_id = %principle.id, oracle = oracle_id, error = %e, "malformed candidate");
            candidate.with_issue(e.to_string())
        }
    }
}
