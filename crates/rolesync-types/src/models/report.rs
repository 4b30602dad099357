//! Reconciliation reports.
//!
//! A report is created per audit run, filled by the batch iterator, handed to
//! a sink once and then dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::ids::{MemberId, NodeId, RoleId, SyncId};

/// Whether a reconciliation only reports differences or also applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Analyze,
    #[serde(alias = "force-sync")]
    Force,
}

impl SyncMode {
    /// Past-tense verb used in operator-facing summaries.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Analyze => "analyzed",
            Self::Force => "synced",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyze => f.write_str("analyze"),
            Self::Force => f.write_str("force"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analyze" => Ok(Self::Analyze),
            "force" | "force-sync" => Ok(Self::Force),
            other => Err(format!("unknown sync mode '{}', expected analyze or force", other)),
        }
    }
}

/// Non-fatal problem recorded while building a report.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportError {
    #[error("{display_name} in {node}: Member is not manageable")]
    NotManageable { member: MemberId, display_name: String, node: NodeId },

    #[error("{display_name} in {node}: Member is a system account")]
    IsSystemAccount { member: MemberId, display_name: String, node: NodeId },

    #[error("{display_name} does not exist in {node}")]
    NotOnTarget { member: MemberId, display_name: String, node: NodeId },

    #[error("Error processing member {display_name}: {message}")]
    PerMember { member: MemberId, display_name: String, message: String },

    #[error("Error processing node {node}: {message}")]
    NodeFailure { node: NodeId, message: String },

    #[error("Role {role} carries Sync ID {sync_id} but nothing in {node} matches it")]
    MappingInconsistency { role: String, sync_id: SyncId, node: NodeId },

    #[error("General error: {message}")]
    Fatal { message: String },
}

impl ReportError {
    /// Skips are expected outcomes of a pass rather than failures.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::NotManageable { .. } | Self::IsSystemAccount { .. } | Self::NotOnTarget { .. }
        )
    }
}

/// A source role that has no counterpart in the target node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRole {
    pub role_id: RoleId,
    pub role: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_ids: Vec<SyncId>,
}

impl fmt::Display for UnresolvedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "role {} does not exist in target", self.role)
    }
}

/// Role names per target node, keyed by what happened to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeChange {
    /// Analyze mode: what a force pass would do.
    Pending { roles_to_add: Vec<String>, roles_to_remove: Vec<String> },
    /// Force mode: what was actually done.
    Applied {
        roles_added: Vec<String>,
        roles_removed: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDifference {
    pub node: NodeId,
    pub node_name: String,
    #[serde(flatten)]
    pub change: NodeChange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDifference {
    pub member: MemberId,
    pub display_name: String,
    pub nodes: Vec<NodeDifference>,
}

/// Result of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub node: NodeId,
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub members_analyzed: usize,
    pub members_with_differences: Vec<MemberDifference>,
    pub errors: Vec<ReportError>,
    pub elapsed_ms: u64,
}

impl ReconciliationReport {
    pub fn new(node: NodeId, mode: SyncMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            node,
            mode,
            started_at: Utc::now(),
            members_analyzed: 0,
            members_with_differences: Vec::new(),
            errors: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn record_error(&mut self, error: ReportError) {
        self.errors.push(error);
    }

    pub fn has_fatal_error(&self) -> bool {
        self.errors.iter().any(|e| matches!(e, ReportError::Fatal { .. }))
    }

    /// Structured differences document.
    pub fn differences_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plaintext error log, one line per entry. `None` when the run was clean.
    pub fn error_log(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let lines: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        Some(lines.join("\n"))
    }

    pub fn summary(&self) -> String {
        format!(
            "Finished: {} roles for {} members in {:.2} seconds ({} with differences, {} errors)",
            self.mode.verb(),
            self.members_analyzed,
            self.elapsed_ms as f64 / 1000.0,
            self.members_with_differences.len(),
            self.errors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_difference(change: NodeChange) -> MemberDifference {
        MemberDifference {
            member: MemberId::from("u1"),
            display_name: "alice".to_string(),
            nodes: vec![NodeDifference {
                node: NodeId::from("g2"),
                node_name: "Synced".to_string(),
                change,
                unresolved: vec![],
            }],
        }
    }

    #[test]
    fn test_mode_parsing_accepts_force_sync_alias() {
        assert_eq!("force-sync".parse::<SyncMode>().unwrap(), SyncMode::Force);
        assert_eq!("Analyze".parse::<SyncMode>().unwrap(), SyncMode::Analyze);
        assert!("sync".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_pending_and_applied_use_distinct_keys() {
        let mut report = ReconciliationReport::new(NodeId::from("g1"), SyncMode::Analyze);
        report.members_with_differences.push(sample_difference(NodeChange::Pending {
            roles_to_add: vec!["VIP".into()],
            roles_to_remove: vec![],
        }));
        let json = report.differences_json().unwrap();
        assert!(json.contains("\"roles_to_add\""));
        assert!(!json.contains("\"roles_added\""));

        let mut report = ReconciliationReport::new(NodeId::from("g1"), SyncMode::Force);
        report.members_with_differences.push(sample_difference(NodeChange::Applied {
            roles_added: vec!["VIP".into()],
            roles_removed: vec![],
            failed: vec![],
        }));
        let json = report.differences_json().unwrap();
        assert!(json.contains("\"roles_added\""));
        assert!(!json.contains("\"failed\""));
    }

    #[test]
    fn test_error_log_one_line_per_error() {
        let mut report = ReconciliationReport::new(NodeId::from("g1"), SyncMode::Analyze);
        assert!(report.error_log().is_none());

        report.record_error(ReportError::IsSystemAccount {
            member: "b1".into(),
            display_name: "helper-bot".into(),
            node: "g1".into(),
        });
        report.record_error(ReportError::Fatal { message: "fetch failed".into() });

        let log = report.error_log().unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("helper-bot in g1: Member is a system account"));
        assert!(report.has_fatal_error());
    }
}
