//! Ops webhook notification manager
//!
//! Posts backup lifecycle events (failure, success, long-running) to a
//! configured webhook endpoint, rate-limited per rule and event so a
//! flapping backend cannot flood the channel.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::config::{NotificationConfig, NotifyEvent};

/// Notification manager posting JSON events to a webhook
pub struct NotificationManager {
    config: NotificationConfig,
    cache_path: PathBuf,
    client: reqwest::Client,
}

/// A backup event to report
#[derive(Debug, Clone)]
pub struct BackupEvent {
    pub event_type: NotifyEvent,
    /// Rule that triggered the backup; `None` for manual triggers
    pub rule: Option<String>,
    pub snapshot_id: String,
    pub table: String,
    pub message: String,
    pub error: Option<String>,
    pub duration_secs: Option<u64>,
}

/// Wire payload posted to the webhook
#[derive(Debug, Serialize)]
struct WebhookPayload {
    event: String,
    table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<String>,
    snapshot_id: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    timestamp: u64,
}

/// Rate limit cache entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Unix timestamp of last notification
    last_sent: u64,
}

/// Rate limit cache
#[derive(Debug, Serialize, Deserialize, Default)]
struct NotificationCache {
    /// Map of cache key to entry
    entries: HashMap<String, CacheEntry>,
}

impl NotificationManager {
    /// Create a new notification manager
    pub fn new(config: NotificationConfig) -> Self {
        let cache_path = config
            .cache_file
            .clone()
            .unwrap_or_else(Self::default_cache_path);
        Self {
            config,
            cache_path,
            client: reqwest::Client::new(),
        }
    }

    fn default_cache_path() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("catalog-dr-notifications.json")
        } else {
            PathBuf::from("/tmp/catalog-dr-notifications.json")
        }
    }

    /// Check if notifications are enabled for an event type
    pub fn is_enabled(&self, event: &NotifyEvent) -> bool {
        if self.config.webhook_url.is_empty() {
            return false;
        }
        self.config.notify_on.contains(event)
    }

    /// Send an event if enabled and not rate-limited
    pub async fn send(&self, event: BackupEvent) -> Result<()> {
        if !self.is_enabled(&event.event_type) {
            debug!("Notification type {:?} not enabled, skipping", event.event_type);
            return Ok(());
        }

        let cache_key = format!(
            "{}:{:?}",
            event.rule.as_deref().unwrap_or("manual"),
            event.event_type
        );

        if self.is_rate_limited(&cache_key)? {
            debug!("Notification rate-limited for key: {}", cache_key);
            return Ok(());
        }

        let payload = build_payload(&event);
        self.client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("Failed to post webhook")?
            .error_for_status()
            .context("Webhook endpoint rejected notification")?;

        self.update_cache(&cache_key)?;

        info!(
            "Sent {:?} notification for snapshot '{}'",
            event.event_type, event.snapshot_id
        );

        Ok(())
    }

    /// Send a failure notification
    pub async fn send_failure(
        &self,
        rule: Option<&str>,
        snapshot_id: &str,
        table: &str,
        error: &str,
        duration_secs: Option<u64>,
    ) -> Result<()> {
        self.send(BackupEvent {
            event_type: NotifyEvent::Failure,
            rule: rule.map(String::from),
            snapshot_id: snapshot_id.to_string(),
            table: table.to_string(),
            message: format!("Backup failed for table '{}'", table),
            error: Some(error.to_string()),
            duration_secs,
        })
        .await
    }

    /// Send a long-running notification
    pub async fn send_long_running(
        &self,
        rule: Option<&str>,
        snapshot_id: &str,
        table: &str,
        duration_secs: u64,
        threshold_minutes: u64,
    ) -> Result<()> {
        self.send(BackupEvent {
            event_type: NotifyEvent::LongRunning,
            rule: rule.map(String::from),
            snapshot_id: snapshot_id.to_string(),
            table: table.to_string(),
            message: format!(
                "Backup is taking longer than expected (>{} minutes)",
                threshold_minutes
            ),
            error: None,
            duration_secs: Some(duration_secs),
        })
        .await
    }

    /// Send a success notification
    pub async fn send_success(
        &self,
        rule: Option<&str>,
        snapshot_id: &str,
        table: &str,
        duration_secs: u64,
    ) -> Result<()> {
        self.send(BackupEvent {
            event_type: NotifyEvent::Success,
            rule: rule.map(String::from),
            snapshot_id: snapshot_id.to_string(),
            table: table.to_string(),
            message: format!("Backup completed for table '{}'", table),
            error: None,
            duration_secs: Some(duration_secs),
        })
        .await
    }

    /// Check whether the key is inside its rate-limit window
    fn is_rate_limited(&self, cache_key: &str) -> Result<bool> {
        let cache = self.load_cache();
        let now = unix_now();

        if let Some(entry) = cache.entries.get(cache_key) {
            let window_secs = self.config.rate_limit_minutes * 60;
            if now.saturating_sub(entry.last_sent) < window_secs {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Record a sent notification for the key
    fn update_cache(&self, cache_key: &str) -> Result<()> {
        let mut cache = self.load_cache();
        cache
            .entries
            .insert(cache_key.to_string(), CacheEntry { last_sent: unix_now() });

        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }

        let contents =
            serde_json::to_string(&cache).context("Failed to encode notification cache")?;
        fs::write(&self.cache_path, contents).context("Failed to write notification cache")?;
        Ok(())
    }

    /// Load the cache; a missing or corrupt file starts fresh
    fn load_cache(&self) -> NotificationCache {
        fs::read_to_string(&self.cache_path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }
}

fn build_payload(event: &BackupEvent) -> WebhookPayload {
    WebhookPayload {
        event: format!("{:?}", event.event_type).to_lowercase(),
        table: event.table.clone(),
        rule: event.rule.clone(),
        snapshot_id: event.snapshot_id.clone(),
        message: event.message.clone(),
        error: event.error.as_ref().map(|e| truncate(e, 500)),
        duration: event.duration_secs.map(format_duration),
        timestamp: unix_now(),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() > max {
        format!("{}...", &text[..max.saturating_sub(3)])
    } else {
        text.to_string()
    }
}

/// Format seconds as "2h 5m 30s" style text
fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_url(url: &str, cache: PathBuf) -> NotificationConfig {
        NotificationConfig {
            webhook_url: url.to_string(),
            notify_on: vec![NotifyEvent::Failure, NotifyEvent::LongRunning],
            rate_limit_minutes: 60,
            cache_file: Some(cache),
        }
    }

    #[test]
    fn test_disabled_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let manager = NotificationManager::new(config_with_url("", dir.path().join("c.json")));
        assert!(!manager.is_enabled(&NotifyEvent::Failure));
    }

    #[test]
    fn test_enabled_only_for_configured_events() {
        let dir = tempfile::tempdir().unwrap();
        let manager = NotificationManager::new(config_with_url(
            "http://localhost/hook",
            dir.path().join("c.json"),
        ));
        assert!(manager.is_enabled(&NotifyEvent::Failure));
        assert!(!manager.is_enabled(&NotifyEvent::Success));
    }

    #[test]
    fn test_rate_limit_window() {
        let dir = tempfile::tempdir().unwrap();
        let manager = NotificationManager::new(config_with_url(
            "http://localhost/hook",
            dir.path().join("c.json"),
        ));

        assert!(!manager.is_rate_limited("daily:Failure").unwrap());
        manager.update_cache("daily:Failure").unwrap();
        assert!(manager.is_rate_limited("daily:Failure").unwrap());

        // A different key has its own window.
        assert!(!manager.is_rate_limited("daily:Success").unwrap());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7530), "2h 5m 30s");
    }

    #[test]
    fn test_truncate_long_error() {
        let long = "x".repeat(600);
        let truncated = truncate(&long, 500);
        assert!(truncated.len() <= 500);
        assert!(truncated.ends_with("..."));
    }
}
