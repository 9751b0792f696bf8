//! Versioned principle storage.
//!
//! Principles are never deleted. An amendment archives the previous
//! revision and bumps the counter; retirement flips the status and keeps
//! the full history for audit.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use acgs_types::{Principle, PrincipleId, PrincipleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;

/// A logged change of a principle's distance score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceTransition {
    pub principle_id: PrincipleId,
    pub from: f64,
    pub to: f64,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PrincipleRecord {
    current: Principle,
    /// Earlier revisions, oldest first.
    history: Vec<Principle>,
    transitions: Vec<DistanceTransition>,
}

/// Serializable image of the whole store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrincipleSnapshot {
    pub taken_at: DateTime<Utc>,
    pub principles: Vec<Principle>,
    pub history: BTreeMap<PrincipleId, Vec<Principle>>,
}

/// The current constitution.
#[derive(Clone, Default)]
pub struct PrincipleStore {
    records: Arc<RwLock<BTreeMap<PrincipleId, PrincipleRecord>>>,
}

impl PrincipleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new principle at revision 1.
    pub fn insert(&self, mut principle: Principle) -> Result<(), StoreError> {
        let mut records = self.records.write().expect("lock not poisoned");
        if records.contains_key(&principle.id) {
            return Err(StoreError::DuplicatePrinciple(principle.id));
        }
        principle.revision = principle.revision.max(1);
        principle.status = PrincipleStatus::Active;
        info!(
            principle_id = %principle.id,
            priority = principle.priority,
            "principle added"
        );
        records.insert(
            principle.id.clone(),
            PrincipleRecord {
                current: principle,
                history: Vec::new(),
                transitions: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &PrincipleId) -> Result<Principle, StoreError> {
        let records = self.records.read().expect("lock not poisoned");
        records
            .get(id)
            .map(|r| r.current.clone())
            .ok_or_else(|| StoreError::PrincipleNotFound(id.clone()))
    }

    /// Current revision, used for stale-promotion checks.
    pub fn revision(&self, id: &PrincipleId) -> Result<u32, StoreError> {
        self.get(id).map(|p| p.revision)
    }

    /// Active principles, highest priority first.
    pub fn active(&self) -> Vec<Principle> {
        let records = self.records.read().expect("lock not poisoned");
        let mut active: Vec<Principle> = records
            .values()
            .filter(|r| r.current.is_active())
            .map(|r| r.current.clone())
            .collect();
        active.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        active
    }

    /// Apply an amendment. The previous revision is archived.
    pub fn amend(
        &self,
        id: &PrincipleId,
        change: impl FnOnce(&mut Principle),
    ) -> Result<Principle, StoreError> {
        let mut records = self.records.write().expect("lock not poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::PrincipleNotFound(id.clone()))?;
        if !record.current.is_active() {
            return Err(StoreError::PrincipleRetired(id.clone()));
        }

        let previous = record.current.clone();
        let mut next = previous.clone();
        change(&mut next);
        next.id = previous.id.clone();
        next.revision = previous.revision + 1;
        next.status = PrincipleStatus::Active;
        record.history.push(previous);
        record.current = next.clone();

        info!(principle_id = %id, revision = next.revision, "principle amended");
        Ok(next)
    }

    /// Retire a principle. It stays readable with its history.
    pub fn retire(&self, id: &PrincipleId) -> Result<Principle, StoreError> {
        let mut records = self.records.write().expect("lock not poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::PrincipleNotFound(id.clone()))?;
        if !record.current.is_active() {
            return Err(StoreError::PrincipleRetired(id.clone()));
        }
        record.history.push(record.current.clone());
        record.current.status = PrincipleStatus::Retired;
        record.current.revision += 1;
        info!(principle_id = %id, "principle retired");
        Ok(record.current.clone())
    }

    /// Archived revisions, oldest first.
    pub fn history(&self, id: &PrincipleId) -> Result<Vec<Principle>, StoreError> {
        let records = self.records.read().expect("lock not poisoned");
        records
            .get(id)
            .map(|r| r.history.clone())
            .ok_or_else(|| StoreError::PrincipleNotFound(id.clone()))
    }

    /// Record a recomputed distance score. Does not bump the revision.
    pub fn set_distance_score(
        &self,
        id: &PrincipleId,
        score: f64,
        reason: impl Into<String>,
    ) -> Result<DistanceTransition, StoreError> {
        let mut records = self.records.write().expect("lock not poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::PrincipleNotFound(id.clone()))?;
        let transition = DistanceTransition {
            principle_id: id.clone(),
            from: record.current.distance_score,
            to: score.clamp(0.0, 1.0),
            reason: reason.into(),
            at: Utc::now(),
        };
        record.current.distance_score = transition.to;
        record.transitions.push(transition.clone());
        info!(
            principle_id = %id,
            from = transition.from,
            to = transition.to,
            reason = %transition.reason,
            "distance score updated"
        );
        Ok(transition)
    }

    pub fn distance_transitions(&self, id: &PrincipleId) -> Vec<DistanceTransition> {
        let records = self.records.read().expect("lock not poisoned");
        records
            .get(id)
            .map(|r| r.transitions.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("lock not poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> PrincipleSnapshot {
        let records = self.records.read().expect("lock not poisoned");
        PrincipleSnapshot {
            taken_at: Utc::now(),
            principles: records.values().map(|r| r.current.clone()).collect(),
            history: records
                .iter()
                .filter(|(_, r)| !r.history.is_empty())
                .map(|(id, r)| (id.clone(), r.history.clone()))
                .collect(),
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn restore(snapshot: PrincipleSnapshot) -> Self {
        let mut history = snapshot.history;
        let records = snapshot
            .principles
            .into_iter()
            .map(|p| {
                let record = PrincipleRecord {
                    history: history.remove(&p.id).unwrap_or_default(),
                    current: p,
                    transitions: Vec::new(),
                };
                (record.current.id.clone(), record)
            })
            .collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }
}
