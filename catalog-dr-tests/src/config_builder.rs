//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible
//! defaults: fast poll intervals, a temp-dir data file when asked for, and
//! rules/principals added per test.

use catalog_dr::config::{Capability, Config, RuleConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder with fast polling defaults suited to tests
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.global.snapshot_poll_interval_ms = 1;
        config.global.store_retry_base_delay_ms = 1;
        config.global.log_directory = temp_dir.path().join("logs");

        Self { temp_dir, config }
    }

    /// Persist table data to a file inside the temp directory
    pub fn with_data_file(mut self) -> Self {
        self.config.store.data_file = Some(self.temp_dir.path().join("product.json"));
        self
    }

    pub fn with_table_name(mut self, name: &str) -> Self {
        self.config.store.table_name = name.to_string();
        self
    }

    /// Add an enabled backup rule
    pub fn add_rule(mut self, name: &str, schedule: &str, retention_days: u32) -> Self {
        self.config.rules.insert(
            name.to_string(),
            RuleConfig {
                schedule: schedule.to_string(),
                retention_days,
                enabled: true,
                description: format!("Test rule {}", name),
            },
        );
        self
    }

    /// Add a disabled backup rule
    pub fn add_disabled_rule(mut self, name: &str, schedule: &str, retention_days: u32) -> Self {
        self.config.rules.insert(
            name.to_string(),
            RuleConfig {
                schedule: schedule.to_string(),
                retention_days,
                enabled: false,
                description: String::new(),
            },
        );
        self
    }

    /// Add a named principal with the given capabilities
    pub fn add_principal(mut self, name: &str, capabilities: Vec<Capability>) -> Self {
        self.config
            .auth
            .principals
            .insert(name.to_string(), capabilities);
        self
    }

    /// Path inside the builder's temp directory
    pub fn temp_path(&self, file_name: &str) -> PathBuf {
        self.temp_dir.path().join(file_name)
    }

    /// Finish, returning the config and the temp dir keeping paths alive
    pub fn build(self) -> (Config, TempDir) {
        (self.config, self.temp_dir)
    }

    /// Write the config as TOML and return its path with the temp dir
    pub fn write(self) -> (PathBuf, TempDir) {
        let path = self.temp_dir.path().join("catalog-dr.toml");
        let contents = toml::to_string(&self.config).expect("Failed to encode config");
        fs::write(&path, contents).expect("Failed to write config file");
        (path, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
