//! Storage adapter
//!
//! Fronts the replicated table for the router and the orchestrator. Transient
//! `Unavailable` errors are retried here with bounded exponential backoff so
//! callers only ever see the final outcome; every other error passes through
//! untouched.

use crate::error::{Error, Result};
use crate::store::product::Product;
use crate::store::table::{ReplicatedTable, SnapshotJobState};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry budget for transient storage errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per retry after that
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

pub struct StorageAdapter {
    table: Arc<dyn ReplicatedTable>,
    retry: RetryPolicy,
    scan_page_size: usize,
}

impl StorageAdapter {
    pub fn new(table: Arc<dyn ReplicatedTable>, retry: RetryPolicy, scan_page_size: usize) -> Self {
        Self {
            table,
            retry,
            scan_page_size,
        }
    }

    /// Name of the protected table.
    pub fn table_name(&self) -> &str {
        self.table.table_name()
    }

    pub fn table(&self) -> &Arc<dyn ReplicatedTable> {
        &self.table
    }

    /// Run `op` with the adapter's retry budget. Only `Unavailable` is
    /// retried; the last error surfaces once the budget is spent.
    async fn with_retry<T, F, Fut>(&self, op_name: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.retry.base_delay;

        for attempt in 1..=self.retry.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        "Storage {} attempt {}/{} failed ({}), retrying in {:?}",
                        op_name, attempt, self.retry.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }

        // max_attempts >= 1, so the loop always returns.
        unreachable!("retry loop exited without a result")
    }

    pub async fn get(&self, product_id: &str) -> Result<Product> {
        self.with_retry("get", || self.table.get_item(product_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("product '{}'", product_id)))
    }

    /// Upsert; returns the stored record.
    pub async fn put(&self, product: Product) -> Result<Product> {
        self.with_retry("put", || self.table.put_item(product.clone()))
            .await?;
        debug!("Stored product: {}", product.product_id);
        Ok(product)
    }

    pub async fn delete(&self, product_id: &str) -> Result<()> {
        let removed = self
            .with_retry("delete", || self.table.delete_item(product_id))
            .await?;
        if removed {
            debug!("Deleted product: {}", product_id);
            Ok(())
        } else {
            Err(Error::NotFound(format!("product '{}'", product_id)))
        }
    }

    /// Full scan, one finite pass: drains the backend's paged scan.
    pub async fn scan(&self) -> Result<Vec<Product>> {
        let mut products = Vec::new();
        let mut start_after: Option<String> = None;

        loop {
            let page = self
                .with_retry("scan", || {
                    self.table.scan_page(self.scan_page_size, start_after.as_deref())
                })
                .await?;

            products.extend(page.items);
            match page.last_key {
                Some(key) => start_after = Some(key),
                None => break,
            }
        }

        Ok(products)
    }

    /// Initiate an asynchronous full-table copy; returns the backend
    /// snapshot id immediately.
    pub async fn start_snapshot(&self) -> Result<String> {
        self.with_retry("snapshot", || self.table.create_snapshot())
            .await
    }

    /// Single status poll, no retry: the orchestrator's poll loop already
    /// absorbs transient errors at its own cadence.
    pub async fn snapshot_state(&self, snapshot_id: &str) -> Result<SnapshotJobState> {
        self.table.snapshot_state(snapshot_id).await
    }

    pub async fn abort_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.with_retry("abort-snapshot", || self.table.abort_snapshot(snapshot_id))
            .await
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.with_retry("delete-snapshot", || self.table.delete_snapshot(snapshot_id))
            .await
    }

    pub async fn restore_snapshot(&self, snapshot_id: &str, target: &str) -> Result<()> {
        self.with_retry("restore-snapshot", || {
            self.table.restore_snapshot(snapshot_id, target)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::local::LocalTable;

    fn adapter_over(table: LocalTable) -> StorageAdapter {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        StorageAdapter::new(Arc::new(table), retry, 2)
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let adapter = adapter_over(LocalTable::new("Product"));
        let result = adapter.get("ghost").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_fault() {
        let table = LocalTable::new("Product");
        table.put_item(Product::new("p1", "Widget", "tools")).await.unwrap();
        table.inject_faults(2);

        let adapter = adapter_over(table);
        let product = adapter.get("p1").await.unwrap();
        assert_eq!(product.product_title, "Widget");
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_surfaces_unavailable() {
        let table = LocalTable::new("Product");
        table.inject_faults(10);

        let adapter = adapter_over(table);
        let result = adapter.get("p1").await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_scan_drains_all_pages() {
        let table = LocalTable::new("Product");
        for i in 0..5 {
            table
                .put_item(Product::new(format!("p{}", i), "Item", "misc"))
                .await
                .unwrap();
        }

        // Page size 2 forces three backend pages.
        let adapter = adapter_over(table);
        let products = adapter.scan().await.unwrap();
        assert_eq!(products.len(), 5);
        assert_eq!(products[0].product_id, "p0");
        assert_eq!(products[4].product_id, "p4");
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let table = LocalTable::new("Product");
        let adapter = adapter_over(table);

        // A NotFound must come back immediately, not after the retry budget.
        let started = std::time::Instant::now();
        let result = adapter.delete("ghost").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
