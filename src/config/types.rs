use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rules: HashMap<String, RuleConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Scheduler tick granularity
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Snapshot status poll cadence
    #[serde(default = "default_poll_interval")]
    pub snapshot_poll_interval_ms: u64,

    /// A snapshot still in progress after this long is failed
    #[serde(default = "default_snapshot_timeout")]
    pub snapshot_timeout_secs: u64,

    /// Retention applied to manually triggered snapshots
    #[serde(default = "default_manual_retention")]
    pub manual_retention_days: u32,

    #[serde(default = "default_long_running_threshold")]
    pub long_running_threshold_minutes: u64,

    /// Storage retry budget
    #[serde(default = "default_retry_attempts")]
    pub store_retry_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub store_retry_base_delay_ms: u64,

    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            snapshot_poll_interval_ms: default_poll_interval(),
            snapshot_timeout_secs: default_snapshot_timeout(),
            manual_retention_days: default_manual_retention(),
            long_running_threshold_minutes: default_long_running_threshold(),
            store_retry_attempts: default_retry_attempts(),
            store_retry_base_delay_ms: default_retry_base_delay(),
            log_directory: default_log_directory(),
            log_level: default_log_level(),
            log_max_files: default_log_max_files(),
        }
    }
}

/// Protected table configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Data file for the local backend; in-memory only when unset
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,

    /// Regions holding replica copies of the table
    #[serde(default = "default_replica_regions")]
    pub replica_regions: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            data_file: None,
            scan_page_size: default_scan_page_size(),
            replica_regions: default_replica_regions(),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub webhook_url: String,

    #[serde(default = "default_notify_on")]
    pub notify_on: Vec<NotifyEvent>,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_minutes: u64,

    #[serde(default)]
    pub cache_file: Option<PathBuf>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            notify_on: default_notify_on(),
            rate_limit_minutes: default_rate_limit(),
            cache_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyEvent {
    Failure,
    LongRunning,
    Success,
}

/// A capability a principal may hold, gating routes
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Backup,
}

/// Authorization configuration: named principals and their capabilities
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub principals: HashMap<String, Vec<Capability>>,
}

/// Backup rule configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Cron schedule (5 fields)
    pub schedule: String,

    /// Days a snapshot from this rule is kept
    pub retention_days: u32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub description: String,
}

// Default value functions

fn default_tick_interval() -> u64 { 60 }
fn default_poll_interval() -> u64 { 500 }
fn default_snapshot_timeout() -> u64 { 600 }
fn default_manual_retention() -> u32 { 30 }
fn default_long_running_threshold() -> u64 { 15 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_base_delay() -> u64 { 100 }
fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_table_name() -> String { "Product".to_string() }
fn default_scan_page_size() -> usize { 100 }
fn default_replica_regions() -> Vec<String> { vec!["us-east-1".to_string()] }
fn default_enabled() -> bool { true }
fn default_notify_on() -> Vec<NotifyEvent> {
    vec![NotifyEvent::Failure, NotifyEvent::LongRunning]
}
fn default_rate_limit() -> u64 { 60 }
