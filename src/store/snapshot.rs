//! Snapshot records and their lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a snapshot
///
/// `InProgress` transitions to exactly one of the terminal states and never
/// back. A `Failed` snapshot keeps its reason until it is manually deleted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum SnapshotStatus {
    InProgress,
    Completed,
    Failed(String),
}

impl SnapshotStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SnapshotStatus::InProgress)
    }

    /// Short label for table output and notifications.
    pub fn label(&self) -> &'static str {
        match self {
            SnapshotStatus::InProgress => "in_progress",
            SnapshotStatus::Completed => "completed",
            SnapshotStatus::Failed(_) => "failed",
        }
    }
}

/// What caused a backup to run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "rule")]
pub enum BackupTrigger {
    /// Fired by the scheduler for the named rule
    Scheduled(String),
    /// Requested through the API or CLI
    Manual,
}

impl BackupTrigger {
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            BackupTrigger::Scheduled(name) => Some(name),
            BackupTrigger::Manual => None,
        }
    }
}

/// A point-in-time copy of the table, tracked by the orchestrator
///
/// `expires_at` is computed once at creation (`created_at` + the retention of
/// the triggering rule) and is never extended afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub source_resource: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SnapshotStatus,
    pub trigger: BackupTrigger,
}

impl Snapshot {
    /// Whether the retention sweep may delete this snapshot at `now`.
    ///
    /// Only completed snapshots expire; failed ones are kept as failure
    /// evidence until manually deleted.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SnapshotStatus::Completed && self.expires_at <= now
    }
}
