//! Local table backend
//!
//! In-memory implementation of [`ReplicatedTable`] with optional JSON file
//! persistence, used for development and tests. Snapshot copies complete
//! asynchronously: a job stays `InProgress` for a configurable number of
//! status polls before reaching its terminal state, which lets tests observe
//! every phase of the lifecycle. Fault injection mimics a table engine having
//! a transient outage.

use crate::error::{Error, Result};
use crate::store::product::Product;
use crate::store::table::{ReplicatedTable, ScanPage, SnapshotJobState};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum JobOutcome {
    Complete,
    Fail(String),
}

#[derive(Debug)]
struct SnapshotJob {
    data: BTreeMap<String, Product>,
    state: SnapshotJobState,
    polls_remaining: u32,
    outcome: JobOutcome,
}

#[derive(Debug, Default)]
struct LocalState {
    items: BTreeMap<String, Product>,
    snapshots: HashMap<String, SnapshotJob>,
    /// Remaining calls that fail with `Unavailable` (test hook)
    faults_remaining: u32,
    /// Reason the next snapshot job should fail with (test hook)
    fail_next_snapshot: Option<String>,
}

pub struct LocalTable {
    name: String,
    state: Mutex<LocalState>,
    persist_path: Option<PathBuf>,
    /// Status polls a snapshot job stays in progress for before settling
    snapshot_delay_polls: u32,
}

impl LocalTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(LocalState::default()),
            persist_path: None,
            snapshot_delay_polls: 1,
        }
    }

    /// Load items from `path` if it exists and persist every mutation back
    /// to it.
    pub fn with_persistence(name: impl Into<String>, path: PathBuf) -> Result<Self> {
        let mut table = Self::new(name);

        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::Unavailable(format!("failed to read data file: {}", e)))?;
            let items: Vec<Product> = serde_json::from_str(&contents)
                .map_err(|e| Error::Unavailable(format!("corrupt data file: {}", e)))?;

            let mut state = table.state.lock().unwrap();
            for product in items {
                state.items.insert(product.product_id.clone(), product);
            }
            debug!("Loaded {} items from {:?}", state.items.len(), path);
            drop(state);
        }

        table.persist_path = Some(path);
        Ok(table)
    }

    /// Number of status polls a snapshot stays `InProgress` for.
    pub fn with_snapshot_delay(mut self, polls: u32) -> Self {
        self.snapshot_delay_polls = polls;
        self
    }

    /// Make the next `count` backend calls fail with `Unavailable`.
    pub fn inject_faults(&self, count: u32) {
        self.state.lock().unwrap().faults_remaining = count;
    }

    /// Make the next snapshot job settle as `Failed` with `reason`.
    pub fn fail_next_snapshot(&self, reason: impl Into<String>) {
        self.state.lock().unwrap().fail_next_snapshot = Some(reason.into());
    }

    fn check_fault(state: &mut LocalState) -> Result<()> {
        if state.faults_remaining > 0 {
            state.faults_remaining -= 1;
            return Err(Error::Unavailable("injected fault".to_string()));
        }
        Ok(())
    }

    /// Write the current item set to the data file, if persistence is on.
    fn persist(&self, state: &LocalState) -> Result<()> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        let items: Vec<&Product> = state.items.values().collect();
        let contents = serde_json::to_string_pretty(&items)
            .map_err(|e| Error::Unavailable(format!("failed to encode data file: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Unavailable(format!("failed to create data dir: {}", e)))?;
        }
        std::fs::write(path, contents)
            .map_err(|e| Error::Unavailable(format!("failed to write data file: {}", e)))
    }
}

#[async_trait]
impl ReplicatedTable for LocalTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    async fn get_item(&self, product_id: &str) -> Result<Option<Product>> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;
        Ok(state.items.get(product_id).cloned())
    }

    async fn put_item(&self, product: Product) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;
        state.items.insert(product.product_id.clone(), product);
        self.persist(&state)
    }

    async fn delete_item(&self, product_id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;
        let removed = state.items.remove(product_id).is_some();
        if removed {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    async fn scan_page(&self, limit: usize, start_after: Option<&str>) -> Result<ScanPage> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;

        let lower = match start_after {
            Some(key) => Bound::Excluded(key.to_string()),
            None => Bound::Unbounded,
        };

        let items: Vec<Product> = state
            .items
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, product)| product.clone())
            .collect();

        // Another page exists only if something sorts after the last key
        // returned here.
        let last_key = match items.last() {
            Some(product)
                if state
                    .items
                    .range((
                        Bound::Excluded(product.product_id.clone()),
                        Bound::Unbounded,
                    ))
                    .next()
                    .is_some() =>
            {
                Some(product.product_id.clone())
            }
            _ => None,
        };

        Ok(ScanPage { items, last_key })
    }

    async fn create_snapshot(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;

        let snapshot_id = format!("snap-{}", Uuid::new_v4());
        let outcome = match state.fail_next_snapshot.take() {
            Some(reason) => JobOutcome::Fail(reason),
            None => JobOutcome::Complete,
        };

        let job = SnapshotJob {
            data: state.items.clone(),
            state: SnapshotJobState::InProgress,
            polls_remaining: self.snapshot_delay_polls,
            outcome,
        };
        state.snapshots.insert(snapshot_id.clone(), job);

        debug!("Started snapshot copy: {}", snapshot_id);
        Ok(snapshot_id)
    }

    async fn snapshot_state(&self, snapshot_id: &str) -> Result<SnapshotJobState> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;

        let job = state
            .snapshots
            .get_mut(snapshot_id)
            .ok_or_else(|| Error::NotFound(format!("snapshot '{}'", snapshot_id)))?;

        if job.state == SnapshotJobState::InProgress {
            if job.polls_remaining > 0 {
                job.polls_remaining -= 1;
            }
            if job.polls_remaining == 0 {
                job.state = match &job.outcome {
                    JobOutcome::Complete => SnapshotJobState::Completed,
                    JobOutcome::Fail(reason) => SnapshotJobState::Failed(reason.clone()),
                };
            }
        }

        Ok(job.state.clone())
    }

    async fn abort_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;

        if let Some(job) = state.snapshots.get_mut(snapshot_id) {
            if job.state == SnapshotJobState::InProgress {
                job.state = SnapshotJobState::Failed("aborted".to_string());
            }
        }
        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;
        state.snapshots.remove(snapshot_id);
        Ok(())
    }

    async fn restore_snapshot(&self, snapshot_id: &str, target: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_fault(&mut state)?;

        if target != self.name {
            return Err(Error::BadRequest(format!(
                "unknown target table '{}'",
                target
            )));
        }

        let data = {
            let job = state
                .snapshots
                .get(snapshot_id)
                .ok_or_else(|| Error::NotFound(format!("snapshot '{}'", snapshot_id)))?;

            match job.state {
                SnapshotJobState::Completed => job.data.clone(),
                _ => return Err(Error::NotRestorable(snapshot_id.to_string())),
            }
        };

        state.items = data;
        self.persist(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Product {
        Product::new("p1", "Widget", "tools")
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let table = LocalTable::new("Product");
        table.put_item(widget()).await.unwrap();

        let got = table.get_item("p1").await.unwrap();
        assert_eq!(got, Some(widget()));
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let table = LocalTable::new("Product");
        table.put_item(widget()).await.unwrap();

        assert!(table.delete_item("p1").await.unwrap());
        assert!(!table.delete_item("p1").await.unwrap());
        assert_eq!(table.get_item("p1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_pages_in_key_order() {
        let table = LocalTable::new("Product");
        for i in 0..5 {
            table
                .put_item(Product::new(format!("p{}", i), "Item", "misc"))
                .await
                .unwrap();
        }

        let first = table.scan_page(2, None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.last_key.as_deref(), Some("p1"));

        let second = table.scan_page(2, first.last_key.as_deref()).await.unwrap();
        assert_eq!(second.items[0].product_id, "p2");

        let last = table.scan_page(10, second.last_key.as_deref()).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.last_key, None);
    }

    #[tokio::test]
    async fn test_persistence_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("product.json");

        let table = LocalTable::with_persistence("Product", path.clone()).unwrap();
        table.put_item(widget()).await.unwrap();
        drop(table);

        let reloaded = LocalTable::with_persistence("Product", path).unwrap();
        assert_eq!(reloaded.get_item("p1").await.unwrap(), Some(widget()));
    }

    #[tokio::test]
    async fn test_snapshot_completes_after_polls() {
        let table = LocalTable::new("Product").with_snapshot_delay(2);
        table.put_item(widget()).await.unwrap();

        let id = table.create_snapshot().await.unwrap();
        assert_eq!(
            table.snapshot_state(&id).await.unwrap(),
            SnapshotJobState::InProgress
        );
        assert_eq!(
            table.snapshot_state(&id).await.unwrap(),
            SnapshotJobState::Completed
        );
    }

    #[tokio::test]
    async fn test_failed_snapshot_is_not_restorable() {
        let table = LocalTable::new("Product");
        table.fail_next_snapshot("disk full");

        let id = table.create_snapshot().await.unwrap();
        assert_eq!(
            table.snapshot_state(&id).await.unwrap(),
            SnapshotJobState::Failed("disk full".to_string())
        );

        let result = table.restore_snapshot(&id, "Product").await;
        assert!(matches!(result, Err(Error::NotRestorable(_))));
    }

    #[tokio::test]
    async fn test_restore_overwrites_table() {
        let table = LocalTable::new("Product");
        table.put_item(widget()).await.unwrap();

        let id = table.create_snapshot().await.unwrap();
        table.snapshot_state(&id).await.unwrap();

        // Mutate after the snapshot, then restore.
        table.put_item(Product::new("p2", "Gadget", "toys")).await.unwrap();
        table.delete_item("p1").await.unwrap();

        table.restore_snapshot(&id, "Product").await.unwrap();
        assert_eq!(table.get_item("p1").await.unwrap(), Some(widget()));
        assert_eq!(table.get_item("p2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fault_injection_surfaces_unavailable() {
        let table = LocalTable::new("Product");
        table.inject_faults(1);

        let result = table.get_item("p1").await;
        assert!(matches!(result, Err(Error::Unavailable(_))));

        // Fault budget consumed, next call succeeds.
        assert!(table.get_item("p1").await.unwrap().is_none());
    }
}
