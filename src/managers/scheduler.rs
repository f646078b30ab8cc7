//! Clock-driven backup scheduler
//!
//! A single periodic tick asks the backup plan which rules are due and
//! dispatches one job per due rule as an independent task; the loop never
//! awaits job completion. A per-rule in-flight guard prevents the same rule
//! from overlapping itself while distinct rules run fully in parallel.
//!
//! Missed ticks are not replayed: after process downtime the loop resumes
//! with the current time and skipped occurrences stay skipped (known
//! limitation, no catch-up policy).

use crate::managers::orchestrator::RecoveryOrchestrator;
use crate::policy::BackupPlan;
use crate::utils::clock::Clock;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{info, warn};

/// Tracks which rules have a backup currently executing
#[derive(Clone, Default)]
pub struct InFlightSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSet {
    /// Claim `name`; returns `None` while a previous claim is still held.
    /// The guard releases the claim on drop.
    pub fn try_acquire(&self, name: &str) -> Option<InFlightGuard> {
        let mut set = self.inner.lock().unwrap();
        if set.insert(name.to_string()) {
            Some(InFlightGuard {
                set: Arc::clone(&self.inner),
                name: name.to_string(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().unwrap().contains(name)
    }
}

pub struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.name);
    }
}

pub struct Scheduler {
    plan: Arc<RwLock<BackupPlan>>,
    orchestrator: Arc<RecoveryOrchestrator>,
    clock: Arc<dyn Clock>,
    in_flight: InFlightSet,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        plan: Arc<RwLock<BackupPlan>>,
        orchestrator: Arc<RecoveryOrchestrator>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            plan,
            orchestrator,
            clock,
            in_flight: InFlightSet::default(),
            tick_interval,
        }
    }

    /// Run the tick loop until the surrounding task is cancelled.
    pub async fn run(&self) {
        info!(
            "Scheduler started (tick every {:?}, {} rules)",
            self.tick_interval,
            self.plan.read().unwrap().rules().len()
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        // Late ticks fire once and realign; missed occurrences are not
        // replayed.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One scheduling pass: dispatch due rules, then sweep retention.
    /// Public so tests can drive the loop deterministically.
    pub async fn tick(&self) {
        let now = self.clock.now();
        let due = self.plan.read().unwrap().due_rules(now);

        for rule in due {
            let Some(guard) = self.in_flight.try_acquire(&rule.name) else {
                warn!(
                    "Backup for rule '{}' still in flight, skipping occurrence",
                    rule.name
                );
                continue;
            };

            self.plan.write().unwrap().mark_fired(&rule.name, now);
            info!("Dispatching backup for rule '{}'", rule.name);

            let orchestrator = Arc::clone(&self.orchestrator);
            tokio::spawn(async move {
                let _guard = guard;
                orchestrator.run_scheduled_backup(&rule).await;
            });
        }

        match self.orchestrator.retention_sweep(now).await {
            Ok(deleted) if !deleted.is_empty() => {
                info!("Retention sweep removed {} snapshot(s)", deleted.len());
            }
            Ok(_) => {}
            Err(e) => warn!("Retention sweep failed: {}", e),
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_excludes_same_rule() {
        let set = InFlightSet::default();

        let guard = set.try_acquire("daily");
        assert!(guard.is_some());
        assert!(set.contains("daily"));

        // Same rule cannot be claimed twice.
        assert!(set.try_acquire("daily").is_none());

        // Distinct rules are independent.
        let other = set.try_acquire("hourly");
        assert!(other.is_some());

        drop(guard);
        assert!(!set.contains("daily"));
        assert!(set.try_acquire("daily").is_some());
    }
}
