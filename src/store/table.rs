//! Replicated table abstraction
//!
//! The physical multi-region table engine is an external collaborator; this
//! trait is the contract the control plane needs from it: item operations,
//! paged scan, and snapshot primitives with point-in-time restore. A local
//! implementation lives in [`super::local`].

use crate::error::Result;
use crate::store::product::Product;
use async_trait::async_trait;

/// Backend-side state of an asynchronous snapshot copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotJobState {
    InProgress,
    Completed,
    Failed(String),
}

/// One page of a table scan
#[derive(Debug, Clone)]
pub struct ScanPage {
    pub items: Vec<Product>,
    /// Key to pass as `start_after` for the next page; `None` when the scan
    /// is exhausted.
    pub last_key: Option<String>,
}

/// Contract for the replicated key-value table
///
/// Implementations must persist every mutating call durably before
/// returning. Transient faults surface as [`crate::error::Error::Unavailable`];
/// the adapter owns retries, implementations must not retry internally.
#[async_trait]
pub trait ReplicatedTable: Send + Sync {
    /// Table name (the protected resource identifier).
    fn table_name(&self) -> &str;

    async fn get_item(&self, product_id: &str) -> Result<Option<Product>>;

    /// Upsert: overwrite when the key exists, insert otherwise.
    async fn put_item(&self, product: Product) -> Result<()>;

    /// Returns `true` when an item was removed, `false` when the key was
    /// absent.
    async fn delete_item(&self, product_id: &str) -> Result<bool>;

    /// One page of items in stable key order, starting strictly after
    /// `start_after`.
    async fn scan_page(&self, limit: usize, start_after: Option<&str>) -> Result<ScanPage>;

    /// Begin an asynchronous full-table copy; returns the snapshot id
    /// immediately while the copy proceeds in the background.
    async fn create_snapshot(&self) -> Result<String>;

    async fn snapshot_state(&self, snapshot_id: &str) -> Result<SnapshotJobState>;

    /// Abort an in-progress copy. Aborting a terminal snapshot is a no-op.
    async fn abort_snapshot(&self, snapshot_id: &str) -> Result<()>;

    /// Drop the stored copy. Deleting an unknown snapshot is a no-op so the
    /// retention sweep stays idempotent.
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;

    /// Overwrite `target` with the snapshot contents.
    async fn restore_snapshot(&self, snapshot_id: &str, target: &str) -> Result<()>;
}
