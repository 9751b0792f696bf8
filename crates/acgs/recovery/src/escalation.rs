//! Escalation packets and the human review queue.
//!
//! A packet carries everything a reviewer needs: the principle, every rule
//! attempted for it and the full validation history. Approval promotes one
//! of the attempted rules with the reviewer's identity recorded.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use acgs_store::{ActiveRuleSet, AuditRecord, AuditSink, PrincipleStore};
use acgs_types::{CandidateRule, GovernanceFault, HumanApproval, Principle, RuleId, ValidationReport};
use acgs_validator::{promote_with_approval, Promotion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RecoveryError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationPacket {
    pub id: Uuid,
    pub principle: Principle,
    pub attempted_rules: Vec<CandidateRule>,
    pub reports: Vec<ValidationReport>,
    pub reason: String,
    pub fault: GovernanceFault,
    pub created_at: DateTime<Utc>,
}

impl EscalationPacket {
    pub fn new(
        principle: Principle,
        attempted_rules: Vec<CandidateRule>,
        reports: Vec<ValidationReport>,
        reason: impl Into<String>,
        fault: GovernanceFault,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            principle,
            attempted_rules,
            reports,
            reason: reason.into(),
            fault,
            created_at: Utc::now(),
        }
    }

    /// One-paragraph summary for a reviewer.
    pub fn summary(&self) -> String {
        let last = self
            .reports
            .last()
            .and_then(|r| r.first_blocking())
            .map(|o| format!("; last failure at {} tier: {}", o.tier, o.detail))
            .unwrap_or_default();
        format!(
            "principle {} (priority {}): {} after {} attempted rules and {} reports{}",
            self.principle.id,
            self.principle.priority,
            self.reason,
            self.attempted_rules.len(),
            self.reports.len(),
            last
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Approved {
        rule_id: RuleId,
        approval: HumanApproval,
        version: u64,
    },
    Rejected {
        reviewer: String,
        reason: String,
        at: DateTime<Utc>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub packet: EscalationPacket,
    pub status: ReviewStatus,
}

/// Escalations awaiting a human decision.
#[derive(Clone, Default)]
pub struct HumanReviewQueue {
    items: Arc<Mutex<BTreeMap<Uuid, ReviewItem>>>,
}

impl HumanReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet and send its fault to the audit sink.
    pub fn submit(&self, packet: EscalationPacket, audit: &dyn AuditSink) -> Uuid {
        let id = packet.id;
        warn!(
            escalation_id = %id,
            principle_id = %packet.principle.id,
            attempts = packet.attempted_rules.len(),
            fault = %packet.fault,
            "escalated to human review"
        );
        audit.record(AuditRecord::Escalation {
            principle_id: packet.principle.id.clone(),
            fault: packet.fault.clone(),
        });
        self.items.lock().expect("lock not poisoned").insert(
            id,
            ReviewItem {
                packet,
                status: ReviewStatus::Pending,
            },
        );
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<ReviewItem> {
        self.items.lock().expect("lock not poisoned").get(id).cloned()
    }

    pub fn pending(&self) -> Vec<EscalationPacket> {
        self.items
            .lock()
            .expect("lock not poisoned")
            .values()
            .filter(|i| i.status == ReviewStatus::Pending)
            .map(|i| i.packet.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("lock not poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Promote one of the packet's attempted rules on the reviewer's
    /// authority.
    pub fn approve(
        &self,
        id: &Uuid,
        rule_id: &RuleId,
        approval: HumanApproval,
        principles: &PrincipleStore,
        rule_set: &ActiveRuleSet,
        audit: &dyn AuditSink,
    ) -> Result<Promotion, RecoveryError> {
        let candidate = {
            let items = self.items.lock().expect("lock not poisoned");
            let item = items.get(id).ok_or(RecoveryError::EscalationNotFound(*id))?;
            if item.status != ReviewStatus::Pending {
                return Err(RecoveryError::AlreadyDecided(*id));
            }
            item.packet
                .attempted_rules
                .iter()
                .find(|c| c.id == *rule_id)
                .cloned()
                .ok_or_else(|| RecoveryError::RuleNotInPacket {
                    packet: *id,
                    rule_id: rule_id.clone(),
                })?
        };

        let promotion =
            promote_with_approval(&candidate, approval.clone(), principles, rule_set, audit)?;

        let mut items = self.items.lock().expect("lock not poisoned");
        if let Some(item) = items.get_mut(id) {
            item.status = ReviewStatus::Approved {
                rule_id: rule_id.clone(),
                approval: approval.clone(),
                version: promotion.version,
            };
        }
        info!(
            escalation_id = %id,
            rule_id = %rule_id,
            approver = %approval.approver,
            version = promotion.version,
            "escalation approved"
        );
        Ok(promotion)
    }

    pub fn reject(&self, id: &Uuid, reviewer: &str, reason: &str) -> Result<(), RecoveryError> {
        let mut items = self.items.lock().expect("lock not poisoned");
        let item = items.get_mut(id).ok_or(RecoveryError::EscalationNotFound(*id))?;
        if item.status != ReviewStatus::Pending {
            return Err(RecoveryError::AlreadyDecided(*id));
        }
        item.status = ReviewStatus::Rejected {
            reviewer: reviewer.to_string(),
            reason: reason.to_string(),
            at: Utc::now(),
        };
        info!(escalation_id = %id, reviewer, reason, "escalation rejected");
        Ok(())
    }
}
