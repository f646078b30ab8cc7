//! Component assembly
//!
//! Wires configuration into the running component graph: backend table,
//! storage adapter, backup plan, orchestrator, scheduler, and router. The
//! CLI and the test suite build the same graph through here, optionally
//! with an injected clock.

use crate::config::{build_plan, Config};
use crate::error::Error;
use crate::managers::notification::NotificationManager;
use crate::managers::orchestrator::{OrchestratorSettings, RecoveryOrchestrator};
use crate::managers::scheduler::Scheduler;
use crate::policy::BackupPlan;
use crate::router::{Principal, Router};
use crate::store::{LocalTable, ReplicatedTable, RetryPolicy, StorageAdapter};
use crate::utils::clock::{Clock, SystemClock};
use anyhow::{Context, Result};
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub struct App {
    pub config: Config,
    pub adapter: Arc<StorageAdapter>,
    pub plan: Arc<RwLock<BackupPlan>>,
    pub orchestrator: Arc<RecoveryOrchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub router: Router,
}

impl App {
    /// Build the component graph against the wall clock.
    pub fn build(config: Config) -> Result<Self> {
        Self::build_with_clock(config, Arc::new(SystemClock))
    }

    /// Build with an injected clock (deterministic tests drive time
    /// manually).
    pub fn build_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let table: Arc<dyn ReplicatedTable> = match &config.store.data_file {
            Some(path) => Arc::new(
                LocalTable::with_persistence(config.store.table_name.clone(), path.clone())
                    .map_err(|e| anyhow::anyhow!(e))
                    .context("Failed to open table data file")?,
            ),
            None => Arc::new(LocalTable::new(config.store.table_name.clone())),
        };

        let retry = RetryPolicy {
            max_attempts: config.global.store_retry_attempts,
            base_delay: Duration::from_millis(config.global.store_retry_base_delay_ms),
        };
        let adapter = Arc::new(StorageAdapter::new(
            table,
            retry,
            config.store.scan_page_size,
        ));

        let plan = Arc::new(RwLock::new(
            build_plan(&config).context("Failed to build backup plan")?,
        ));

        let notifier = (!config.notifications.webhook_url.is_empty())
            .then(|| NotificationManager::new(config.notifications.clone()));

        let settings = OrchestratorSettings {
            poll_interval: Duration::from_millis(config.global.snapshot_poll_interval_ms),
            snapshot_timeout: chrono::Duration::seconds(
                config.global.snapshot_timeout_secs as i64,
            ),
            manual_retention_days: config.global.manual_retention_days,
            long_running_threshold: chrono::Duration::minutes(
                config.global.long_running_threshold_minutes as i64,
            ),
        };
        let orchestrator = Arc::new(RecoveryOrchestrator::new(
            Arc::clone(&adapter),
            Arc::clone(&clock),
            notifier,
            settings,
        ));

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&plan),
            Arc::clone(&orchestrator),
            clock,
            Duration::from_secs(config.global.tick_interval_secs),
        ));

        let router = Router::new(Arc::clone(&adapter), Arc::clone(&orchestrator));

        Ok(Self {
            config,
            adapter,
            plan,
            orchestrator,
            scheduler,
            router,
        })
    }

    /// Resolve a caller principal from the `[auth]` section.
    ///
    /// With no principals configured, local callers get full capabilities;
    /// once principals exist, callers must name one.
    pub fn principal(&self, name: Option<&str>) -> crate::error::Result<Principal> {
        let principals = &self.config.auth.principals;

        match name {
            Some(name) => {
                let capabilities = principals.get(name).ok_or_else(|| {
                    Error::BadRequest(format!("unknown principal '{}'", name))
                })?;
                Ok(Principal::new(name, capabilities.clone()))
            }
            None if principals.is_empty() => Ok(Principal::admin("local-admin")),
            None => Err(Error::BadRequest(
                "principals are configured; name one with --as".to_string(),
            )),
        }
    }
}
