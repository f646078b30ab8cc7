//! Test utilities for catalog-dr
//!
//! Shared builders and fixtures for exercising the control plane end to
//! end: a fluent configuration builder backed by a temp directory and
//! product fixtures for seeding the table.

pub mod config_builder;
pub mod fixtures;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;

// Re-export types from the main crate for convenience
pub use catalog_dr::app::App;
pub use catalog_dr::config::{Capability, Config, RuleConfig};
pub use catalog_dr::router::{Method, Principal, Request};
pub use catalog_dr::store::{Product, Snapshot, SnapshotStatus};
pub use catalog_dr::utils::clock::ManualClock;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
