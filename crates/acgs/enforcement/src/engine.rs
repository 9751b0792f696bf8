//! The PGC engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use acgs_policy_lang::{EvalLimits, PolicyLangError};
use acgs_store::{ActiveRuleSet, AuditRecord, AuditSink, InMemoryAuditSink, RuleSetSnapshot};
use acgs_types::{EnforcementDecision, FailSafeReason, Proposal, Verdict};
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::DecisionCache;
use crate::config::EnforcementConfig;
use crate::error::EnforcementError;
use crate::evaluator::{CompiledEvaluator, RuleEvaluator};
use crate::resolve::{fired_rules, resolve, Resolution};
use crate::stats::{EngineStats, EnforcementStats};

/// Runtime gate over the upstream proposal stream.
///
/// Each evaluation pins one rule-set snapshot for its whole duration, so a
/// promotion that lands mid-evaluation is seen by the next call only.
pub struct PgcEngine {
    rule_set: ActiveRuleSet,
    config: EnforcementConfig,
    evaluator: Arc<dyn RuleEvaluator>,
    audit: Arc<dyn AuditSink>,
    cache: DecisionCache,
    stats: EngineStats,
}

impl PgcEngine {
    pub fn new(rule_set: ActiveRuleSet, config: EnforcementConfig) -> Result<Self, EnforcementError> {
        config.validate()?;
        Ok(Self {
            rule_set,
            cache: DecisionCache::new(config.cache_capacity),
            config,
            evaluator: Arc::new(CompiledEvaluator),
            audit: Arc::new(InMemoryAuditSink::new()),
            stats: EngineStats::default(),
        })
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    pub fn rule_set(&self) -> &ActiveRuleSet {
        &self.rule_set
    }

    pub fn stats(&self) -> EnforcementStats {
        self.stats.snapshot()
    }

    pub fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Evaluate against the version current at call time.
    pub async fn evaluate_current(&self, proposal: &Proposal) -> EnforcementDecision {
        self.evaluate(proposal, self.rule_set.snapshot()).await
    }

    /// Evaluate a batch against one pinned version.
    pub async fn evaluate_batch(&self, proposals: &[Proposal]) -> Vec<EnforcementDecision> {
        let snapshot = self.rule_set.snapshot();
        join_all(
            proposals
                .iter()
                .map(|p| self.evaluate(p, Arc::clone(&snapshot))),
        )
        .await
    }

    /// Evaluate `proposal` against an explicit rule-set version handle.
    /// Never fails: overruns, evaluator panics and evaluation errors become a
    /// fail-safe deny.
    pub async fn evaluate(
        &self,
        proposal: &Proposal,
        snapshot: Arc<RuleSetSnapshot>,
    ) -> EnforcementDecision {
        let started = Instant::now();
        let version = snapshot.version;
        let fingerprint = proposal.fingerprint();
        self.cache.observe(version);

        if let Some(cached) = self.cache.get(&fingerprint, version) {
            let decision = EnforcementDecision {
                decision_id: Uuid::new_v4(),
                proposal_id: proposal.id.clone(),
                latency_us: elapsed_us(started),
                cache_hit: true,
                decided_at: Utc::now(),
                ..cached
            };
            return self.finish(decision);
        }

        let ceiling = Duration::from_millis(self.config.latency_ceiling_ms);
        let limits = EvalLimits::new(self.config.eval_step_budget).with_deadline(started + ceiling);
        let evaluator = Arc::clone(&self.evaluator);
        let payload = proposal.payload.clone();
        let pinned = Arc::clone(&snapshot);
        let task = tokio::task::spawn_blocking(move || {
            fired_rules(&pinned, &payload, evaluator.as_ref(), &limits)
                .map(|fired| resolve(&fired))
        });

        let ceiling_ms = self.config.latency_ceiling_ms;
        let outcome = match tokio::time::timeout(ceiling, task).await {
            Err(_) => Err(FailSafeReason::Timeout { ceiling_ms }),
            Ok(Err(join)) => Err(FailSafeReason::Internal(join.to_string())),
            Ok(Ok(Err((_, PolicyLangError::DeadlineExceeded)))) => {
                Err(FailSafeReason::Timeout { ceiling_ms })
            }
            Ok(Ok(Err((rule_id, e)))) => Err(FailSafeReason::EvaluationError {
                rule_id,
                message: e.to_string(),
            }),
            Ok(Ok(Ok(resolution))) => Ok(resolution),
        };

        let decision = match outcome {
            Ok(resolution) => decided(proposal, version, resolution, elapsed_us(started)),
            Err(reason) => {
                EnforcementDecision::fail_safe(proposal, version, reason, elapsed_us(started))
            }
        };
        self.cache.insert(&decision);
        self.finish(decision)
    }

    fn finish(&self, decision: EnforcementDecision) -> EnforcementDecision {
        for conflict in &decision.conflicts {
            warn!(
                proposal_id = %decision.proposal_id,
                winner = %conflict.winner,
                winner_priority = conflict.winner_priority,
                loser = %conflict.loser,
                loser_priority = conflict.loser_priority,
                "runtime rule conflict"
            );
        }
        if let Some(reason) = &decision.fail_safe {
            warn!(
                proposal_id = %decision.proposal_id,
                version = decision.rule_set_version,
                latency_us = decision.latency_us,
                %reason,
                "fail-safe deny"
            );
        } else if decision.verdict == Verdict::Allow {
            debug!(
                proposal_id = %decision.proposal_id,
                version = decision.rule_set_version,
                cache_hit = decision.cache_hit,
                latency_us = decision.latency_us,
                "proposal allowed"
            );
        } else {
            info!(
                proposal_id = %decision.proposal_id,
                verdict = %decision.verdict,
                version = decision.rule_set_version,
                violations = decision.violations.len(),
                cache_hit = decision.cache_hit,
                latency_us = decision.latency_us,
                "proposal gated"
            );
        }
        self.stats.record(&decision);
        self.audit.record(AuditRecord::Decision(decision.clone()));
        decision
    }
}

fn decided(
    proposal: &Proposal,
    version: u64,
    resolution: Resolution,
    latency_us: u64,
) -> EnforcementDecision {
    EnforcementDecision {
        decision_id: Uuid::new_v4(),
        proposal_id: proposal.id.clone(),
        fingerprint: proposal.fingerprint(),
        verdict: resolution.verdict,
        violations: resolution.violations,
        primary: resolution.primary,
        overridden: resolution.overridden,
        conflicts: resolution.conflicts,
        rule_set_version: version,
        latency_us,
        cache_hit: false,
        fail_safe: None,
        decided_at: Utc::now(),
    }
}

fn elapsed_us(started: Instant) -> u64 {
    started.elapsed().as_micros().min(u64::MAX as u128) as u64
}
