//! Product fixtures and seeding helpers

use catalog_dr::app::App;
use catalog_dr::store::{Product, SnapshotStatus};
use std::time::Duration;

pub fn widget() -> Product {
    Product::new("p1", "Widget", "tools")
}

pub fn ergo_mouse() -> Product {
    Product::new("p2", "Ergo Mouse", "computer")
}

/// A small catalog of distinct products
pub fn sample_catalog(count: usize) -> Vec<Product> {
    (0..count)
        .map(|i| {
            Product::new(
                format!("p{:03}", i),
                format!("Item {}", i),
                if i % 2 == 0 { "tools" } else { "computer" },
            )
        })
        .collect()
}

/// Seed the table through the adapter
pub async fn seed(app: &App, products: &[Product]) {
    for product in products {
        app.adapter
            .put(product.clone())
            .await
            .expect("Failed to seed product");
    }
}

/// Poll until the snapshot settles; panics if it never does
pub async fn wait_terminal(app: &App, snapshot_id: &str) -> SnapshotStatus {
    for _ in 0..500 {
        if let Some(snapshot) = app.orchestrator.snapshot(snapshot_id) {
            if snapshot.status.is_terminal() {
                return snapshot.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("snapshot '{}' never reached a terminal state", snapshot_id);
}
