use anyhow::Result;
use catalog_dr::app::App;
use catalog_dr::managers::logging;
use catalog_dr::router::{Method, Request};
use catalog_dr::store::SnapshotStatus;
use catalog_dr::utils::locker::PlanLock;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "catalog-dr")]
#[command(about = "Disaster-recovery control plane for the product catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "catalog-dr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop (scheduled backups + retention sweeps)
    Serve,

    /// Trigger a manual backup and wait for it to finish (Ctrl-C cancels)
    Backup,

    /// Restore a snapshot into the table (overwrites current contents)
    Restore {
        /// Snapshot ID to restore
        #[arg(short, long)]
        snapshot: String,

        /// Target table (defaults to the configured table)
        #[arg(short, long)]
        target: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show tracked snapshots
    Snapshots,

    /// Delete a snapshot (the only way to remove a failed snapshot)
    Forget {
        /// Snapshot ID to delete
        #[arg(short, long)]
        snapshot: String,
    },

    /// Show plan and snapshot health overview
    Status,

    /// Run a retention sweep now
    Sweep,

    /// Feed one request through the API router
    Invoke {
        /// HTTP method (GET, POST, PUT, DELETE)
        #[arg(short, long)]
        method: String,

        /// Route path, e.g. /getProduct
        #[arg(short, long)]
        path: String,

        /// Query parameters as key=value (repeatable)
        #[arg(short, long)]
        query: Vec<String>,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,

        /// Principal to call as (from [auth.principals])
        #[arg(long = "as")]
        principal: Option<String>,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load and validate configuration
    let config = catalog_dr::load_config(&cli.config)?;

    // Setup logging with file rotation (must keep guard alive)
    let logging_config = logging::LoggingConfig::from_config(
        &config.global.log_directory,
        &config.global.log_level,
        config.global.log_max_files,
    );
    let _log_guard = logging::init_logging(&logging_config)?;

    let app = App::build(config)?;

    // If no command specified, show the status overview
    let command = cli.command.unwrap_or(Commands::Status);

    match command {
        Commands::Serve => {
            // One scheduler instance per table
            let _plan_lock = PlanLock::acquire(app.adapter.table_name())?;

            let rules = app.plan.read().unwrap().rules().len();
            println!(
                "Guarding table '{}' ({} rule(s), tick every {}s)",
                app.adapter.table_name(),
                rules,
                app.config.global.tick_interval_secs
            );
            println!("Press Ctrl-C to stop.");

            tokio::select! {
                _ = app.scheduler.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    println!("\nShutting down.");
                }
            }
        }

        Commands::Backup => {
            println!("Starting backup for table '{}'...", app.adapter.table_name());

            let snapshot = app.orchestrator.start_manual_backup().await?;
            let snapshot_id = snapshot.snapshot_id.clone();
            println!("Snapshot: {}", snapshot_id);

            tokio::select! {
                status = wait_terminal(&app, &snapshot_id) => {
                    match status {
                        SnapshotStatus::Completed => {
                            println!("✓ Backup completed successfully");
                        }
                        SnapshotStatus::Failed(reason) => {
                            eprintln!("✗ Backup failed: {}", reason);
                            std::process::exit(1);
                        }
                        SnapshotStatus::InProgress => unreachable!("wait_terminal returns terminal states"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("\nCancelling backup...");
                    app.orchestrator.cancel_backup(&snapshot_id)?;
                    wait_terminal(&app, &snapshot_id).await;
                    eprintln!("✗ Backup cancelled");
                    std::process::exit(1);
                }
            }
        }

        Commands::Restore { snapshot, target, yes } => {
            use dialoguer::Confirm;

            println!("=== Restore Snapshot: {} ===\n", snapshot);

            let record = match app.orchestrator.snapshot(&snapshot) {
                Some(record) => record,
                None => {
                    eprintln!("Snapshot '{}' not found", snapshot);
                    std::process::exit(1);
                }
            };

            println!("Source table: {}", record.source_resource);
            println!("Created: {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("Status: {}", record.status.label());

            let target_table = target.unwrap_or_else(|| app.adapter.table_name().to_string());
            println!("\nRestore target: {} (contents will be OVERWRITTEN)", target_table);
            println!();

            if !yes {
                let confirm = Confirm::new()
                    .with_prompt("Do you want to proceed with the restore?")
                    .default(false)
                    .interact()?;

                if !confirm {
                    println!("Restore cancelled.");
                    std::process::exit(0);
                }
            }

            match app.orchestrator.restore(&snapshot, &target_table).await {
                Ok(()) => {
                    println!("\n✓ Restore completed successfully!");
                    println!("Table '{}' now holds the snapshot contents", target_table);
                }
                Err(e) => {
                    eprintln!("\n✗ Restore failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Snapshots => {
            let snapshots = app.orchestrator.snapshots();

            println!("=== Snapshots for table: {} ===\n", app.adapter.table_name());

            if snapshots.is_empty() {
                println!("  No snapshots tracked.");
            } else {
                println!(
                    "  {:<42} {:<17} {:<17} {:<12} {:<10}",
                    "ID", "Created", "Expires", "Status", "Trigger"
                );
                println!("  {}", "-".repeat(100));

                for snapshot in &snapshots {
                    let trigger = match snapshot.trigger.rule_name() {
                        Some(rule) => rule.to_string(),
                        None => "manual".to_string(),
                    };
                    println!(
                        "  {:<42} {:<17} {:<17} {:<12} {:<10}",
                        snapshot.snapshot_id,
                        snapshot.created_at.format("%Y-%m-%d %H:%M"),
                        snapshot.expires_at.format("%Y-%m-%d %H:%M"),
                        snapshot.status.label(),
                        trigger
                    );
                }

                println!("\n  Total: {} snapshot(s)", snapshots.len());
            }
        }

        Commands::Forget { snapshot } => {
            match app.orchestrator.delete_snapshot(&snapshot).await {
                Ok(()) => println!("✓ Deleted snapshot {}", snapshot),
                Err(e) => {
                    eprintln!("✗ Could not delete snapshot: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Status => {
            println!("=== Catalog DR Status ===\n");
            println!("Table: {}", app.adapter.table_name());
            println!(
                "Replica regions: {}",
                app.config.store.replica_regions.join(", ")
            );
            match &app.config.store.data_file {
                Some(path) => println!("Data file: {}", path.display()),
                None => println!("Data file: (in-memory)"),
            }
            println!();

            let plan = app.plan.read().unwrap();
            println!("Backup rules: {}", plan.rules().len());
            for rule in plan.rules() {
                let state = if rule.enabled { "enabled" } else { "disabled" };
                let description = app
                    .config
                    .rules
                    .get(&rule.name)
                    .map(|r| r.description.as_str())
                    .filter(|d| !d.is_empty())
                    .unwrap_or("-");
                println!(
                    "  {} - '{}' keep {}d ({}) {}",
                    rule.name,
                    rule.schedule.expression(),
                    rule.retention_days,
                    state,
                    description
                );
            }
            drop(plan);
            println!();

            let snapshots = app.orchestrator.snapshots();
            println!("Snapshots tracked: {}", snapshots.len());

            let latest_completed = snapshots
                .iter()
                .rev()
                .find(|s| s.status == SnapshotStatus::Completed);

            match latest_completed {
                Some(snapshot) => {
                    let age = Utc::now().signed_duration_since(snapshot.created_at);
                    let hours = age.num_hours();

                    println!("Last completed backup: {}", snapshot.snapshot_id);
                    println!("Age: {} hours ago", hours);

                    // Health indicator based on age
                    let health = if hours < 24 {
                        "✓ Healthy (recent backup)"
                    } else if hours < 48 {
                        "⚠ Warning (backup is 1-2 days old)"
                    } else {
                        "✗ Critical (backup is over 2 days old)"
                    };
                    println!("Health: {}", health);
                }
                None => {
                    println!("Health: ✗ No completed backups");
                }
            }

            let failed = snapshots
                .iter()
                .filter(|s| matches!(s.status, SnapshotStatus::Failed(_)))
                .count();
            if failed > 0 {
                println!("⚠ {} failed snapshot(s) awaiting acknowledgement", failed);
            }
        }

        Commands::Sweep => {
            let deleted = app.orchestrator.retention_sweep(Utc::now()).await?;

            if deleted.is_empty() {
                println!("Nothing to sweep.");
            } else {
                println!("Swept {} expired snapshot(s):", deleted.len());
                for snapshot_id in deleted {
                    println!("  {}", snapshot_id);
                }
            }
        }

        Commands::Invoke { method, path, query, body, principal } => {
            let method = Method::from_str(&method)?;
            let mut request = Request::new(method, path);

            for pair in query {
                let Some((key, value)) = pair.split_once('=') else {
                    anyhow::bail!("query parameter '{}' is not key=value", pair);
                };
                request = request.with_query(key, value);
            }

            if let Some(body) = body {
                request = request.with_body(serde_json::from_str(&body)?);
            }

            let principal = app.principal(principal.as_deref())?;
            let response = app.router.dispatch(request, &principal).await;

            println!("{}", response.status);
            println!("{}", serde_json::to_string_pretty(&response.body)?);

            if response.status >= 400 {
                std::process::exit(1);
            }
        }

        Commands::Validate => {
            println!("Configuration is valid!");
            println!("Table: {}", app.config.store.table_name);
            println!("Rules: {}", app.config.rules.len());
            println!("Principals: {}", app.config.auth.principals.len());
        }
    }

    Ok(())
}

/// Poll the registry until the snapshot reaches a terminal state.
async fn wait_terminal(app: &App, snapshot_id: &str) -> SnapshotStatus {
    loop {
        if let Some(snapshot) = app.orchestrator.snapshot(snapshot_id) {
            if snapshot.status.is_terminal() {
                return snapshot.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
