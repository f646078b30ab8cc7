//! Recovery orchestrator - executes backup, restore, and retention jobs
//!
//! Owns the snapshot registry. A backup job initiates an asynchronous table
//! copy through the storage adapter, records it as `InProgress`, and polls
//! the backend until the copy settles. Scheduled failures are recorded and
//! logged but never propagate to the scheduler loop; manual failures surface
//! to the caller.

use crate::error::{Error, Result};
use crate::managers::notification::NotificationManager;
use crate::policy::BackupRule;
use crate::store::{BackupTrigger, Snapshot, SnapshotJobState, SnapshotStatus, StorageAdapter};
use crate::utils::clock::Clock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};

/// Tuning knobs for backup execution
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Delay between snapshot status polls
    pub poll_interval: Duration,
    /// How long a snapshot may stay in progress before it is failed
    pub snapshot_timeout: chrono::Duration,
    /// Retention applied to manually triggered snapshots
    pub manual_retention_days: u32,
    /// Backups running longer than this raise a long-running notification
    pub long_running_threshold: chrono::Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            snapshot_timeout: chrono::Duration::seconds(600),
            manual_retention_days: 30,
            long_running_threshold: chrono::Duration::minutes(15),
        }
    }
}

struct SnapshotRecord {
    snapshot: Snapshot,
    cancel_requested: bool,
}

/// In-memory registry of snapshot records
///
/// Terminal states are sticky: once a snapshot is `Completed` or `Failed`,
/// no further transition is applied.
#[derive(Clone, Default)]
struct SnapshotRegistry {
    inner: Arc<RwLock<HashMap<String, SnapshotRecord>>>,
}

impl SnapshotRegistry {
    fn insert(&self, snapshot: Snapshot) {
        self.inner.write().unwrap().insert(
            snapshot.snapshot_id.clone(),
            SnapshotRecord {
                snapshot,
                cancel_requested: false,
            },
        );
    }

    fn get(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.inner
            .read()
            .unwrap()
            .get(snapshot_id)
            .map(|r| r.snapshot.clone())
    }

    fn list(&self) -> Vec<Snapshot> {
        let mut snapshots: Vec<Snapshot> = self
            .inner
            .read()
            .unwrap()
            .values()
            .map(|r| r.snapshot.clone())
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        snapshots
    }

    /// Apply a terminal status if the snapshot is still in progress.
    /// Returns the record as it stands afterwards.
    fn finish(&self, snapshot_id: &str, status: SnapshotStatus) -> Option<Snapshot> {
        let mut inner = self.inner.write().unwrap();
        let record = inner.get_mut(snapshot_id)?;
        if record.snapshot.status == SnapshotStatus::InProgress {
            record.snapshot.status = status;
        }
        Some(record.snapshot.clone())
    }

    fn request_cancel(&self, snapshot_id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let record = inner
            .get_mut(snapshot_id)
            .ok_or_else(|| Error::NotFound(format!("snapshot '{}'", snapshot_id)))?;

        if record.snapshot.trigger != BackupTrigger::Manual {
            return Err(Error::BadRequest(
                "scheduled backups are not cancellable".to_string(),
            ));
        }
        if record.snapshot.status.is_terminal() {
            return Err(Error::BadRequest(format!(
                "snapshot '{}' is already {}",
                snapshot_id,
                record.snapshot.status.label()
            )));
        }

        record.cancel_requested = true;
        Ok(())
    }

    fn cancel_requested(&self, snapshot_id: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .get(snapshot_id)
            .map(|r| r.cancel_requested)
            .unwrap_or(false)
    }

    fn remove(&self, snapshot_id: &str) {
        self.inner.write().unwrap().remove(snapshot_id);
    }

    /// Snapshots the retention sweep may delete at `now`.
    fn expired(&self, now: DateTime<Utc>) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .values()
            .filter(|r| r.snapshot.is_expired(now))
            .map(|r| r.snapshot.snapshot_id.clone())
            .collect()
    }
}

pub struct RecoveryOrchestrator {
    adapter: Arc<StorageAdapter>,
    registry: SnapshotRegistry,
    clock: Arc<dyn Clock>,
    notifier: Option<NotificationManager>,
    settings: OrchestratorSettings,
}

impl RecoveryOrchestrator {
    pub fn new(
        adapter: Arc<StorageAdapter>,
        clock: Arc<dyn Clock>,
        notifier: Option<NotificationManager>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            adapter,
            registry: SnapshotRegistry::default(),
            clock,
            notifier,
            settings,
        }
    }

    /// Run a backup to completion. Used by the scheduler (per rule) and the
    /// CLI manual path; errors surface to the caller.
    pub async fn run_backup(
        &self,
        trigger: BackupTrigger,
        retention_days: u32,
    ) -> Result<Snapshot> {
        let snapshot = self.begin(trigger, retention_days).await?;
        self.await_completion(&snapshot.snapshot_id).await
    }

    /// Run a manual backup to completion.
    pub async fn run_manual_backup(&self) -> Result<Snapshot> {
        self.run_backup(BackupTrigger::Manual, self.settings.manual_retention_days)
            .await
    }

    /// Start a manual backup and return its `InProgress` handle immediately;
    /// completion is driven by a spawned task. This is the `createBackup`
    /// API path.
    pub async fn start_manual_backup(self: &Arc<Self>) -> Result<Snapshot> {
        let snapshot = self
            .begin(BackupTrigger::Manual, self.settings.manual_retention_days)
            .await?;

        let this = Arc::clone(self);
        let snapshot_id = snapshot.snapshot_id.clone();
        tokio::spawn(async move {
            if let Err(e) = this.await_completion(&snapshot_id).await {
                warn!("Manual backup '{}' did not complete: {}", snapshot_id, e);
            }
        });

        Ok(snapshot)
    }

    /// Scheduler entry point: failures are logged and recorded, never
    /// returned, so one bad rule cannot take down the tick loop.
    pub async fn run_scheduled_backup(&self, rule: &BackupRule) {
        let trigger = BackupTrigger::Scheduled(rule.name.clone());
        match self.run_backup(trigger, rule.retention_days).await {
            Ok(snapshot) => {
                info!(
                    "Scheduled backup for rule '{}' completed: {}",
                    rule.name, snapshot.snapshot_id
                );
            }
            Err(e) => {
                error!("Scheduled backup for rule '{}' failed: {}", rule.name, e);
            }
        }
    }

    /// Request cancellation of a manual backup that has not completed yet.
    /// The polling task observes the request, aborts the backend copy, and
    /// settles the record as failed.
    pub fn cancel_backup(&self, snapshot_id: &str) -> Result<()> {
        self.registry.request_cancel(snapshot_id)?;
        info!("Cancellation requested for snapshot '{}'", snapshot_id);
        Ok(())
    }

    /// Delete all completed snapshots whose retention has lapsed at `now`.
    /// Failed snapshots are kept until manually deleted. Returns the ids
    /// removed; sweeping an already-deleted snapshot is a no-op.
    pub async fn retention_sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let expired = self.registry.expired(now);
        let mut deleted = Vec::new();

        for snapshot_id in expired {
            match self.adapter.delete_snapshot(&snapshot_id).await {
                Ok(()) | Err(Error::NotFound(_)) => {
                    self.registry.remove(&snapshot_id);
                    info!("Retention sweep deleted snapshot '{}'", snapshot_id);
                    deleted.push(snapshot_id);
                }
                Err(e) => {
                    // Keep the record so the next sweep retries the delete.
                    warn!("Retention sweep could not delete '{}': {}", snapshot_id, e);
                }
            }
        }

        Ok(deleted)
    }

    /// Manually delete a terminal snapshot.
    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let snapshot = self
            .registry
            .get(snapshot_id)
            .ok_or_else(|| Error::NotFound(format!("snapshot '{}'", snapshot_id)))?;

        if !snapshot.status.is_terminal() {
            return Err(Error::BadRequest(format!(
                "snapshot '{}' is still in progress; cancel it first",
                snapshot_id
            )));
        }

        self.adapter.delete_snapshot(snapshot_id).await?;
        self.registry.remove(snapshot_id);
        info!("Deleted snapshot '{}'", snapshot_id);
        Ok(())
    }

    /// Restore a completed snapshot into `target`, overwriting it. The
    /// caller confirms intent; there is no dry-run.
    pub async fn restore(&self, snapshot_id: &str, target: &str) -> Result<()> {
        let snapshot = self
            .registry
            .get(snapshot_id)
            .ok_or_else(|| Error::NotFound(format!("snapshot '{}'", snapshot_id)))?;

        if snapshot.status != SnapshotStatus::Completed {
            return Err(Error::NotRestorable(format!(
                "snapshot '{}' is {}",
                snapshot_id,
                snapshot.status.label()
            )));
        }

        self.adapter.restore_snapshot(snapshot_id, target).await?;
        info!("Restored snapshot '{}' into '{}'", snapshot_id, target);
        Ok(())
    }

    pub fn snapshot(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.registry.get(snapshot_id)
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.registry.list()
    }

    /// Initiate the backend copy and record the snapshot.
    async fn begin(&self, trigger: BackupTrigger, retention_days: u32) -> Result<Snapshot> {
        let snapshot_id = self.adapter.start_snapshot().await?;
        let created_at = self.clock.now();

        let snapshot = Snapshot {
            snapshot_id: snapshot_id.clone(),
            source_resource: self.adapter.table_name().to_string(),
            created_at,
            expires_at: created_at + chrono::Duration::days(i64::from(retention_days)),
            status: SnapshotStatus::InProgress,
            trigger,
        };
        self.registry.insert(snapshot.clone());

        info!(
            "Backup started: {} (table '{}', expires {})",
            snapshot_id,
            snapshot.source_resource,
            snapshot.expires_at.format("%Y-%m-%d %H:%M")
        );
        Ok(snapshot)
    }

    /// Poll the backend until the copy settles, honoring cancellation and
    /// the snapshot timeout.
    async fn await_completion(&self, snapshot_id: &str) -> Result<Snapshot> {
        let snapshot = self
            .registry
            .get(snapshot_id)
            .ok_or_else(|| Error::NotFound(format!("snapshot '{}'", snapshot_id)))?;

        let deadline = snapshot.created_at + self.settings.snapshot_timeout;
        let rule = snapshot.trigger.rule_name().map(String::from);
        let mut long_running_notified = false;

        loop {
            if self.registry.cancel_requested(snapshot_id) {
                if let Err(e) = self.adapter.abort_snapshot(snapshot_id).await {
                    warn!("Failed to abort backend copy for '{}': {}", snapshot_id, e);
                }
                self.registry
                    .finish(snapshot_id, SnapshotStatus::Failed("cancelled".to_string()));
                info!("Backup '{}' cancelled", snapshot_id);
                return Err(Error::Cancelled);
            }

            let now = self.clock.now();
            let elapsed_secs = (now - snapshot.created_at).num_seconds().max(0) as u64;

            if !long_running_notified && now - snapshot.created_at > self.settings.long_running_threshold {
                self.notify_long_running(rule.as_deref(), snapshot_id, elapsed_secs)
                    .await;
                long_running_notified = true;
            }

            match self.adapter.snapshot_state(snapshot_id).await {
                Ok(SnapshotJobState::Completed) => {
                    let finished = self
                        .registry
                        .finish(snapshot_id, SnapshotStatus::Completed)
                        .ok_or_else(|| Error::NotFound(format!("snapshot '{}'", snapshot_id)))?;

                    // A cancellation may have settled the record first.
                    if let SnapshotStatus::Failed(reason) = &finished.status {
                        return Err(failure_error(reason));
                    }

                    self.notify_success(rule.as_deref(), snapshot_id, elapsed_secs)
                        .await;
                    return Ok(finished);
                }
                Ok(SnapshotJobState::Failed(reason)) => {
                    self.registry
                        .finish(snapshot_id, SnapshotStatus::Failed(reason.clone()));
                    self.notify_failure(rule.as_deref(), snapshot_id, &reason, elapsed_secs)
                        .await;
                    return Err(failure_error(&reason));
                }
                Ok(SnapshotJobState::InProgress) => {}
                Err(e) => {
                    // Transient poll errors are absorbed until the deadline.
                    warn!("Status poll for '{}' failed: {}", snapshot_id, e);
                }
            }

            if self.clock.now() >= deadline {
                let reason = "timed out".to_string();
                self.registry
                    .finish(snapshot_id, SnapshotStatus::Failed(reason.clone()));
                self.notify_failure(rule.as_deref(), snapshot_id, &reason, elapsed_secs)
                    .await;
                return Err(failure_error(&reason));
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn notify_success(&self, rule: Option<&str>, snapshot_id: &str, duration_secs: u64) {
        if let Some(ref notifier) = self.notifier {
            let table = self.adapter.table_name();
            if let Err(e) = notifier
                .send_success(rule, snapshot_id, table, duration_secs)
                .await
            {
                warn!("Failed to send success notification: {}", e);
            }
        }
    }

    async fn notify_failure(
        &self,
        rule: Option<&str>,
        snapshot_id: &str,
        reason: &str,
        duration_secs: u64,
    ) {
        if let Some(ref notifier) = self.notifier {
            let table = self.adapter.table_name();
            if let Err(e) = notifier
                .send_failure(rule, snapshot_id, table, reason, Some(duration_secs))
                .await
            {
                warn!("Failed to send failure notification: {}", e);
            }
        }
    }

    async fn notify_long_running(&self, rule: Option<&str>, snapshot_id: &str, duration_secs: u64) {
        if let Some(ref notifier) = self.notifier {
            let table = self.adapter.table_name();
            let threshold_minutes = self
                .settings
                .long_running_threshold
                .num_minutes()
                .max(0) as u64;
            if let Err(e) = notifier
                .send_long_running(rule, snapshot_id, table, duration_secs, threshold_minutes)
                .await
            {
                warn!("Failed to send long-running notification: {}", e);
            }
        }
    }
}

fn failure_error(reason: &str) -> Error {
    Error::Unavailable(format!("backup failed: {}", reason))
}
