// Integration tests for the scheduler and the backup lifecycle it drives

use catalog_dr::app::App;
use catalog_dr::config::{Config, RuleConfig};
use catalog_dr::error::Error;
use catalog_dr::managers::orchestrator::{OrchestratorSettings, RecoveryOrchestrator};
use catalog_dr::managers::scheduler::Scheduler;
use catalog_dr::policy::{BackupPlan, BackupRule};
use catalog_dr::store::{LocalTable, RetryPolicy, SnapshotStatus, StorageAdapter};
use catalog_dr::utils::clock::ManualClock;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;

fn at_0910() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 10, 0).unwrap()
}

fn daily_config() -> Config {
    let mut config = Config::default();
    config.global.snapshot_poll_interval_ms = 1;
    config.rules.insert(
        "daily".to_string(),
        RuleConfig {
            schedule: "10 9 * * *".to_string(),
            retention_days: 30,
            enabled: true,
            description: "Daily catalog backup".to_string(),
        },
    );
    config
}

async fn wait_for_snapshots(app: &App, count: usize) {
    for _ in 0..500 {
        let snapshots = app.orchestrator.snapshots();
        if snapshots.len() >= count && snapshots.iter().all(|s| s.status.is_terminal()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("expected {} terminal snapshot(s)", count);
}

/// Manual test rig with direct access to the backend table.
fn rig(
    table: LocalTable,
    rules: Vec<BackupRule>,
    start: DateTime<Utc>,
) -> (Scheduler, Arc<RecoveryOrchestrator>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let retry = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
    };
    let adapter = Arc::new(StorageAdapter::new(Arc::new(table), retry, 100));

    let settings = OrchestratorSettings {
        poll_interval: Duration::from_millis(1),
        snapshot_timeout: chrono::Duration::seconds(600),
        manual_retention_days: 30,
        long_running_threshold: chrono::Duration::minutes(15),
    };
    let orchestrator = Arc::new(RecoveryOrchestrator::new(
        adapter,
        clock.clone(),
        None,
        settings,
    ));

    let mut plan = BackupPlan::new("Product");
    for rule in rules {
        plan.add_rule(rule).unwrap();
    }

    let scheduler = Scheduler::new(
        Arc::new(RwLock::new(plan)),
        Arc::clone(&orchestrator),
        clock.clone(),
        Duration::from_secs(60),
    );

    (scheduler, orchestrator, clock)
}

async fn wait_terminal(orchestrator: &RecoveryOrchestrator, count: usize) {
    for _ in 0..500 {
        let snapshots = orchestrator.snapshots();
        if snapshots.len() >= count && snapshots.iter().all(|s| s.status.is_terminal()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("expected {} terminal snapshot(s)", count);
}

#[tokio::test]
async fn test_rule_fires_once_per_occurrence() {
    let clock = Arc::new(ManualClock::new(at_0910()));
    let app = App::build_with_clock(daily_config(), clock.clone()).unwrap();

    // Several evaluations within the scheduled minute dispatch one job.
    app.scheduler.tick().await;
    app.scheduler.tick().await;
    clock.advance(chrono::Duration::seconds(30));
    app.scheduler.tick().await;

    wait_for_snapshots(&app, 1).await;
    let snapshots = app.orchestrator.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, SnapshotStatus::Completed);
    assert_eq!(snapshots[0].trigger.rule_name(), Some("daily"));
}

#[tokio::test]
async fn test_daily_rule_lifecycle_with_sweep() {
    let clock = Arc::new(ManualClock::new(at_0910()));
    let app = App::build_with_clock(daily_config(), clock.clone()).unwrap();

    // 09:10: the scheduler creates the snapshot and it completes.
    app.scheduler.tick().await;
    wait_for_snapshots(&app, 1).await;

    let snapshot = &app.orchestrator.snapshots()[0];
    let snapshot_id = snapshot.snapshot_id.clone();
    assert_eq!(snapshot.status, SnapshotStatus::Completed);
    assert_eq!(
        snapshot.expires_at,
        snapshot.created_at + chrono::Duration::days(30)
    );

    // 31 days later the sweep (colocated with the tick) deletes it.
    clock.advance(chrono::Duration::days(31));
    app.scheduler.tick().await;
    assert!(app.orchestrator.snapshot(&snapshot_id).is_none());

    // A restore attempt after deletion reports the snapshot as missing.
    let result = app.orchestrator.restore(&snapshot_id, "Product").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_next_occurrence_fires_again() {
    let clock = Arc::new(ManualClock::new(at_0910()));
    let app = App::build_with_clock(daily_config(), clock.clone()).unwrap();

    app.scheduler.tick().await;
    wait_for_snapshots(&app, 1).await;

    clock.advance(chrono::Duration::days(1));
    app.scheduler.tick().await;
    wait_for_snapshots(&app, 2).await;

    assert_eq!(app.orchestrator.snapshots().len(), 2);
}

#[tokio::test]
async fn test_scheduled_failure_does_not_stop_the_loop() {
    let table = LocalTable::new("Product");
    table.fail_next_snapshot("replica lagging");

    let rule = BackupRule::new("daily", "10 9 * * *", 30).unwrap();
    let (scheduler, orchestrator, clock) = rig(table, vec![rule], at_0910());

    // The failing occurrence is recorded, not raised.
    scheduler.tick().await;
    wait_terminal(&orchestrator, 1).await;
    assert!(matches!(
        orchestrator.snapshots()[0].status,
        SnapshotStatus::Failed(_)
    ));

    // The next occurrence proceeds normally.
    clock.advance(chrono::Duration::days(1));
    scheduler.tick().await;
    wait_terminal(&orchestrator, 2).await;

    let statuses: Vec<_> = orchestrator
        .snapshots()
        .iter()
        .map(|s| s.status.clone())
        .collect();
    assert!(statuses.contains(&SnapshotStatus::Completed));
}

#[tokio::test]
async fn test_in_flight_guard_skips_overlapping_occurrence() {
    // A copy slow enough to still be running at the next occurrence.
    let table = LocalTable::new("Product").with_snapshot_delay(100_000);
    let rule = BackupRule::new("minutely", "* * * * *", 7).unwrap();
    let (scheduler, orchestrator, clock) = rig(table, vec![rule], at_0910());

    scheduler.tick().await;

    // Give the dispatched job time to start its copy.
    for _ in 0..500 {
        if !orchestrator.snapshots().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(orchestrator.snapshots().len(), 1);
    assert!(scheduler.in_flight().contains("minutely"));

    // The next minute's occurrence is skipped while the first is running.
    clock.advance(chrono::Duration::minutes(1));
    scheduler.tick().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(orchestrator.snapshots().len(), 1);
}

#[tokio::test]
async fn test_distinct_rules_run_in_parallel() {
    let table = LocalTable::new("Product");
    let rules = vec![
        BackupRule::new("daily", "10 9 * * *", 30).unwrap(),
        BackupRule::new("archive", "10 9 * * *", 365).unwrap(),
    ];
    let (scheduler, orchestrator, _clock) = rig(table, rules, at_0910());

    scheduler.tick().await;
    wait_terminal(&orchestrator, 2).await;

    let snapshots = orchestrator.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().all(|s| s.status == SnapshotStatus::Completed));

    // Retention differs per rule.
    let mut retentions: Vec<i64> = snapshots
        .iter()
        .map(|s| (s.expires_at - s.created_at).num_days())
        .collect();
    retentions.sort();
    assert_eq!(retentions, vec![30, 365]);
}

#[tokio::test]
async fn test_restore_roundtrip_through_scheduler_snapshot() {
    let table = LocalTable::new("Product");
    let rule = BackupRule::new("daily", "10 9 * * *", 30).unwrap();
    let (scheduler, orchestrator, _clock) = rig(table, vec![rule], at_0910());

    scheduler.tick().await;
    wait_terminal(&orchestrator, 1).await;

    let snapshot_id = orchestrator.snapshots()[0].snapshot_id.clone();
    orchestrator.restore(&snapshot_id, "Product").await.unwrap();
}
