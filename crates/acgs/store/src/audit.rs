//! Audit sinks for immutable governance records.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use acgs_types::{EnforcementDecision, GovernanceFault, PrincipleId, RuleId, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

/// Anything the governance layer must keep for audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Validation(ValidationReport),
    Decision(EnforcementDecision),
    Promotion {
        rule_id: RuleId,
        principle_id: PrincipleId,
        version: u64,
        approver: Option<String>,
    },
    Demotion {
        rule_id: RuleId,
        winner: RuleId,
        version: u64,
    },
    Escalation {
        principle_id: PrincipleId,
        fault: GovernanceFault,
    },
}

/// A record with its arrival time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub recorded_at: DateTime<Utc>,
    pub record: AuditRecord,
}

/// Receives audit records. Recording never fails the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Keeps every record in memory.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("lock not poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock not poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn decisions(&self) -> Vec<EnforcementDecision> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e.record {
                AuditRecord::Decision(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn reports(&self) -> Vec<ValidationReport> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e.record {
                AuditRecord::Validation(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.entries
            .lock()
            .expect("lock not poisoned")
            .push(AuditEntry {
                recorded_at: Utc::now(),
                record,
            });
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonlAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self.writer.lock().expect("lock not poisoned");
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    /// Read every entry back from a file.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, StoreError> {
        let text = std::fs::read_to_string(path)?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(StoreError::from))
            .collect()
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: AuditRecord) {
        let entry = AuditEntry {
            recorded_at: Utc::now(),
            record,
        };
        if let Err(e) = self.append(&entry) {
            warn!(path = %self.path.display(), error = %e, "audit record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acgs_types::{FailSafeReason, Proposal};
    use serde_json::json;

    fn decision() -> EnforcementDecision {
        EnforcementDecision::fail_safe(
            &Proposal::new("p-1", json!({"x": 1})),
            3,
            FailSafeReason::Timeout { ceiling_ms: 5 },
            5_000,
        )
    }

    #[test]
    fn in_memory_sink_filters_by_kind() {
        let sink = InMemoryAuditSink::new();
        sink.record(AuditRecord::Decision(decision()));
        sink.record(AuditRecord::Escalation {
            principle_id: PrincipleId::new("p"),
            fault: GovernanceFault::RecoveryBudgetExhausted {
                principle_id: PrincipleId::new("p"),
                attempts: 4,
            },
        });
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.decisions().len(), 1);
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let path = std::env::temp_dir().join(format!("acgs-audit-{}.jsonl", uuid::Uuid::new_v4()));
        {
            let sink = JsonlAuditSink::open(&path).unwrap();
            sink.record(AuditRecord::Decision(decision()));
            sink.record(AuditRecord::Promotion {
                rule_id: RuleId::new("safety#00000000"),
                principle_id: PrincipleId::new("safety"),
                version: 1,
                approver: None,
            });
        }
        let entries = JsonlAuditSink::read_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].record, AuditRecord::Decision(_)));
        assert!(matches!(
            entries[1].record,
            AuditRecord::Promotion { version: 1, .. }
        ));
        std::fs::remove_file(&path).ok();
    }
}
