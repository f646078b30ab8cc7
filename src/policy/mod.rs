//! Backup policy engine
//!
//! A [`BackupPlan`] holds the backup rules protecting one table. The
//! scheduler asks it which rules are due each tick; firing is recorded per
//! scheduled minute so a rule triggers at most once per occurrence no matter
//! how often `due_rules` is evaluated.
//!
//! The plan is shared as `Arc<RwLock<BackupPlan>>`: `due_rules` is a read,
//! `add_rule`/`remove_rule`/`mark_fired` take the write lock.

mod schedule;

pub use schedule::Schedule;

use crate::error::{Error, Result};
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;

/// A named backup rule: when to snapshot and how long to keep the result
#[derive(Debug, Clone)]
pub struct BackupRule {
    pub name: String,
    pub schedule: Schedule,
    pub retention_days: u32,
    pub enabled: bool,
}

impl BackupRule {
    /// Build a rule, validating the schedule expression.
    pub fn new(name: impl Into<String>, expression: &str, retention_days: u32) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            schedule: Schedule::parse(expression)?,
            retention_days,
            enabled: true,
        })
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

/// The set of rules protecting one resource
///
/// One plan covers one table; duplicate or conflicting snapshot jobs for the
/// same resource cannot arise because rules are keyed by name and the
/// scheduler holds a per-rule in-flight guard.
pub struct BackupPlan {
    resource: String,
    rules: Vec<BackupRule>,
    last_fired: HashMap<String, DateTime<Utc>>,
}

/// Truncate to the scheduled minute a firing is recorded against.
fn occurrence(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

impl BackupPlan {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            rules: Vec::new(),
            last_fired: HashMap::new(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn rules(&self) -> &[BackupRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&BackupRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Add a rule; rejects duplicate names. Schedule validation happened in
    /// [`BackupRule::new`].
    pub fn add_rule(&mut self, rule: BackupRule) -> Result<()> {
        if self.rule(&rule.name).is_some() {
            return Err(Error::BadRequest(format!(
                "rule '{}' already exists",
                rule.name
            )));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn remove_rule(&mut self, name: &str) -> Result<()> {
        let before = self.rules.len();
        self.rules.retain(|r| r.name != name);
        if self.rules.len() == before {
            return Err(Error::NotFound(format!("rule '{}'", name)));
        }
        self.last_fired.remove(name);
        Ok(())
    }

    /// Rules whose schedule matches the minute of `now` and which have not
    /// yet fired for that occurrence. Pure read; record the dispatch with
    /// [`mark_fired`](Self::mark_fired).
    pub fn due_rules(&self, now: DateTime<Utc>) -> Vec<BackupRule> {
        let occurrence = occurrence(now);
        self.rules
            .iter()
            .filter(|rule| {
                rule.enabled
                    && rule.schedule.matches(now)
                    && self.last_fired.get(&rule.name) != Some(&occurrence)
            })
            .cloned()
            .collect()
    }

    /// Record that `name` fired for the occurrence containing `now`.
    pub fn mark_fired(&mut self, name: &str, now: DateTime<Utc>) {
        self.last_fired.insert(name.to_string(), occurrence(now));
    }
}
