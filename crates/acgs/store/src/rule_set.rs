//! The Active Rule Set: the one authoritative, versioned set of compiled
//! rules the enforcement engine reads.
//!
//! Readers take an `Arc<RuleSetSnapshot>` and keep it for the duration of
//! an evaluation. Writers go through a single [`RuleSetWriter`] which builds
//! the next snapshot off to the side and publishes it with one pointer swap,
//! so a reader never sees a half-applied change.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use acgs_policy_lang::{compile_rule, CompiledRule};
use acgs_types::{
    CandidateRule, EnforcementMode, Principle, PrincipleId, PromotionBasis, RuleId, Verdict,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::StoreError;

/// A compiled rule admitted to enforcement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveRule {
    pub id: RuleId,
    pub principle_id: PrincipleId,
    /// Principle revision this rule was synthesized from.
    pub principle_revision: u32,
    pub priority: u8,
    pub body: String,
    pub compiled: Arc<CompiledRule>,
    pub mode: EnforcementMode,
    pub basis: PromotionBasis,
    pub promoted_at: DateTime<Utc>,
}

impl ActiveRule {
    /// Compile a candidate for admission.
    pub fn from_candidate(
        candidate: &CandidateRule,
        principle: &Principle,
        basis: PromotionBasis,
    ) -> Result<Self, StoreError> {
        let compiled =
            compile_rule(&candidate.body).map_err(|e| StoreError::Compile(e.to_string()))?;
        Ok(Self {
            id: candidate.id.clone(),
            principle_id: principle.id.clone(),
            principle_revision: principle.revision,
            priority: principle.priority,
            body: candidate.body.clone(),
            compiled: Arc::new(compiled),
            mode: EnforcementMode::Mandatory,
            basis,
            promoted_at: Utc::now(),
        })
    }

    pub fn with_mode(mut self, mode: EnforcementMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn verdict(&self) -> Verdict {
        self.compiled.verdict
    }

    pub fn is_permit(&self) -> bool {
        self.compiled.verdict == Verdict::Allow
    }
}

/// An immutable version of the rule set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSetSnapshot {
    pub version: u64,
    pub rules: BTreeMap<RuleId, ActiveRule>,
}

impl RuleSetSnapshot {
    pub fn get(&self, id: &RuleId) -> Option<&ActiveRule> {
        self.rules.get(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveRule> {
        self.rules.values()
    }

    pub fn for_principle<'a>(
        &'a self,
        principle: &'a PrincipleId,
    ) -> impl Iterator<Item = &'a ActiveRule> + 'a {
        self.rules.values().filter(move |r| r.principle_id == *principle)
    }

    /// Rules ordered by priority (highest first), then id.
    pub fn by_priority(&self) -> Vec<&ActiveRule> {
        let mut rules: Vec<&ActiveRule> = self.rules.values().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        rules
    }
}

/// Shared handle to the active rule set.
#[derive(Clone, Default)]
pub struct ActiveRuleSet {
    current: Arc<RwLock<Arc<RuleSetSnapshot>>>,
    writer: Arc<Mutex<()>>,
}

impl ActiveRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current version handle. Never blocks on writers building the
    /// next version.
    pub fn snapshot(&self) -> Arc<RuleSetSnapshot> {
        Arc::clone(&self.current.read().expect("lock not poisoned"))
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Start the single write transaction. Blocks other writers until the
    /// returned writer is committed or dropped.
    pub fn begin_write(&self) -> RuleSetWriter<'_> {
        let guard = self.writer.lock().expect("lock not poisoned");
        let base = self.snapshot();
        RuleSetWriter {
            set: self,
            _guard: guard,
            next: (*base).clone(),
            changed: false,
        }
    }

    /// Promote a single rule in its own transaction.
    pub fn promote(&self, rule: ActiveRule) -> u64 {
        let mut writer = self.begin_write();
        writer.promote(rule);
        writer.commit()
    }
}

/// Staged changes to the next rule-set version.
pub struct RuleSetWriter<'a> {
    set: &'a ActiveRuleSet,
    _guard: MutexGuard<'a, ()>,
    next: RuleSetSnapshot,
    changed: bool,
}

impl RuleSetWriter<'_> {
    /// The staged state, including uncommitted changes.
    pub fn staged(&self) -> &RuleSetSnapshot {
        &self.next
    }

    /// Admit a rule. Rules previously promoted for the same principle are
    /// replaced.
    pub fn promote(&mut self, rule: ActiveRule) {
        let replaced: Vec<RuleId> = self
            .next
            .rules
            .values()
            .filter(|r| r.principle_id == rule.principle_id && r.id != rule.id)
            .map(|r| r.id.clone())
            .collect();
        for id in replaced {
            self.next.rules.remove(&id);
            info!(rule_id = %id, principle_id = %rule.principle_id, "superseded rule removed");
        }
        info!(
            rule_id = %rule.id,
            principle_id = %rule.principle_id,
            priority = rule.priority,
            mode = %rule.mode,
            "rule staged for promotion"
        );
        self.next.rules.insert(rule.id.clone(), rule);
        self.changed = true;
    }

    /// Keep a rule active with advisory standing.
    pub fn demote(&mut self, id: &RuleId, by: &RuleId) -> Result<(), StoreError> {
        let rule = self
            .next
            .rules
            .get_mut(id)
            .ok_or_else(|| StoreError::RuleNotFound(id.clone()))?;
        if rule.mode != EnforcementMode::Advisory {
            rule.mode = EnforcementMode::Advisory;
            self.changed = true;
            warn!(rule_id = %id, winner = %by, "rule demoted to advisory");
        }
        Ok(())
    }

    /// Drop every rule synthesized from a principle.
    pub fn remove_principle(&mut self, principle: &PrincipleId) -> usize {
        let before = self.next.rules.len();
        self.next.rules.retain(|_, r| r.principle_id != *principle);
        let removed = before - self.next.rules.len();
        if removed > 0 {
            self.changed = true;
            info!(principle_id = %principle, removed, "rules withdrawn");
        }
        removed
    }

    /// Publish the staged state as the next version. A writer with no
    /// changes leaves the version untouched.
    pub fn commit(mut self) -> u64 {
        let mut current = self.set.current.write().expect("lock not poisoned");
        if !self.changed {
            return current.version;
        }
        self.next.version = current.version + 1;
        let version = self.next.version;
        *current = Arc::new(std::mem::take(&mut self.next));
        info!(version, rules = current.len(), "rule set published");
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn rule(principle: &str, priority: u8, body: &str) -> ActiveRule {
        let p = Principle::new(principle, priority, "test");
        let candidate = CandidateRule::new(p.id.clone(), body, "fixture");
        ActiveRule::from_candidate(
            &candidate,
            &p,
            PromotionBasis::Validated {
                report_id: Uuid::new_v4(),
            },
        )
        .unwrap()
    }

    const DENY_LOW: &str = r#"(rule low (when (< margin 0.2)) (then deny "low margin"))"#;
    const ALLOW_ALL: &str = r#"(rule ok (when (> margin 0)) (then allow "fine"))"#;

    #[test]
    fn promotion_bumps_version() {
        let set = ActiveRuleSet::new();
        assert_eq!(set.version(), 0);
        let v = set.promote(rule("safety", 9, DENY_LOW));
        assert_eq!(v, 1);
        assert_eq!(set.snapshot().len(), 1);
    }

    #[test]
    fn uncompilable_body_rejected() {
        let p = Principle::new("p", 1, "x");
        let candidate = CandidateRule::new(p.id.clone(), "deny everything", "fixture");
        let result = ActiveRule::from_candidate(
            &candidate,
            &p,
            PromotionBasis::Validated {
                report_id: Uuid::new_v4(),
            },
        );
        assert!(matches!(result, Err(StoreError::Compile(_))));
    }

    #[test]
    fn old_snapshot_unchanged_after_promotion() {
        let set = ActiveRuleSet::new();
        set.promote(rule("safety", 9, DENY_LOW));
        let before = set.snapshot();
        set.promote(rule("growth", 3, ALLOW_ALL));
        assert_eq!(before.version, 1);
        assert_eq!(before.len(), 1);
        assert_eq!(set.snapshot().len(), 2);
    }

    #[test]
    fn transaction_is_one_version() {
        let set = ActiveRuleSet::new();
        set.promote(rule("safety", 9, DENY_LOW));
        let low = rule("growth", 3, ALLOW_ALL);
        let low_id = low.id.clone();
        let high_id = set.snapshot().by_priority()[0].id.clone();

        let mut writer = set.begin_write();
        writer.promote(low);
        writer.demote(&low_id, &high_id).unwrap();
        assert_eq!(set.version(), 1);
        let v = writer.commit();

        assert_eq!(v, 2);
        let snap = set.snapshot();
        assert_eq!(snap.get(&low_id).unwrap().mode, EnforcementMode::Advisory);
    }

    #[test]
    fn same_principle_rule_replaced() {
        let set = ActiveRuleSet::new();
        set.promote(rule("safety", 9, DENY_LOW));
        set.promote(rule(
            "safety",
            9,
            r#"(rule low2 (when (< margin 0.3)) (then deny "low margin"))"#,
        ));
        let snap = set.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn empty_commit_keeps_version() {
        let set = ActiveRuleSet::new();
        set.promote(rule("safety", 9, DENY_LOW));
        let writer = set.begin_write();
        assert_eq!(writer.commit(), 1);
        assert!(set
            .begin_write()
            .demote(&RuleId::new("missing"), &RuleId::new("x"))
            .is_err());
    }

    #[test]
    fn remove_principle_withdraws_rules() {
        let set = ActiveRuleSet::new();
        set.promote(rule("safety", 9, DENY_LOW));
        let mut writer = set.begin_write();
        assert_eq!(writer.remove_principle(&PrincipleId::new("safety")), 1);
        assert_eq!(writer.commit(), 2);
        assert!(set.snapshot().is_empty());
    }

    #[tokio::test]
    async fn readers_see_whole_versions() {
        let set = ActiveRuleSet::new();
        let reader_set = set.clone();
        let reader = tokio::spawn(async move {
            for _ in 0..200 {
                let snap = reader_set.snapshot();
                // Every published version adds exactly one rule.
                assert_eq!(snap.len() as u64, snap.version);
                tokio::task::yield_now().await;
            }
        });
        for i in 0..50 {
            let body = format!(r#"(rule r{i} (when (< margin {i})) (then deny "x"))"#);
            set.promote(rule(&format!("p{}", i), 5, &body));
            tokio::task::yield_now().await;
        }
        reader.await.unwrap();
        assert_eq!(set.version(), 50);
    }
}
