//! Runs one replication job: spawns the workers the load type asks for and supervises them
//! until they all ended.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use siphon_config::shared::JobConfig;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel, wait_for_shutdown};
use crate::error::{ErrorKind, SiphonError, SiphonResult};
use crate::plugins::base::{CdcPlugin, CdcTask, CompletionNotifier, FullLoadPlugin, FullLoadTask};
use crate::plugins::registry::{PluginKind, PluginRegistry};
use crate::types::{FullLoadCompletion, TableName};
use crate::workers::base::{WorkerOutcome, WorkerReport};
use crate::workers::cdc::CdcWorker;
use crate::workers::full_load::FullLoadWorker;
use crate::workers::pool::WorkerPool;
use crate::workers::registry::WorkerRegistry;

/// Directory under the output root holding one directory per fully loaded table.
pub const FULL_LOAD_DIRECTORY: &str = "full_load";

/// Directory under the output root holding one directory per table with changes.
pub const CDC_DIRECTORY: &str = "cdc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Idle,
    Running,
    Completed,
    Terminated,
}

impl fmt::Display for OperatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorState::Idle => f.write_str("idle"),
            OperatorState::Running => f.write_str("running"),
            OperatorState::Completed => f.write_str("completed"),
            OperatorState::Terminated => f.write_str("terminated"),
        }
    }
}

/// What happened during one [`Operator::execute`] call.
#[derive(Debug, Clone, Default)]
pub struct OperatorReport {
    /// One entry per spawned worker, in the order they ended.
    pub workers: Vec<WorkerReport>,
    /// Full load completion notifications, in the order they arrived.
    pub notifications: Vec<FullLoadCompletion>,
    /// Whether the run was cut short by a termination request.
    pub terminated: bool,
}

impl OperatorReport {
    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers
            .iter()
            .filter(|report| report.outcome.error().is_some())
    }

    /// Report of the full-load worker of `table_name`, if one ended.
    pub fn full_load_worker(&self, table_name: &TableName) -> Option<&WorkerReport> {
        self.workers
            .iter()
            .find(|report| report.table_name.as_ref() == Some(table_name))
    }
}

/// Controller of one job invocation.
#[derive(Debug)]
pub struct Operator {
    config: JobConfig,
    table_names: Vec<TableName>,
    full_load_plugin: Option<Arc<dyn FullLoadPlugin>>,
    cdc_plugin: Option<Arc<dyn CdcPlugin>>,
    worker_registry: WorkerRegistry,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
    state: OperatorState,
    report: Option<OperatorReport>,
}

impl Operator {
    /// Validates `config` and resolves the plugins its load type needs.
    ///
    /// Fails with [`ErrorKind::ConfigError`] before anything is spawned when a plugin name is
    /// unknown or the table list is invalid.
    pub fn new(
        config: JobConfig,
        plugins: &PluginRegistry,
        worker_registry: WorkerRegistry,
    ) -> SiphonResult<Self> {
        config.validate()?;

        let table_names = parse_table_names(&config.table_names)?;

        let full_load_plugin = if config.load_type.includes_full_load() {
            let name = config.full_load_plugin_name.as_str();
            match plugins.full_load(name) {
                Some(plugin) => Some(plugin),
                None => bail!(
                    ErrorKind::ConfigError,
                    "Incorrect value provided for full load plugin",
                    unknown_plugin_detail(plugins, PluginKind::FullLoad, name)
                ),
            }
        } else {
            None
        };

        let cdc_plugin = if config.load_type.includes_cdc() {
            let name = config.cdc_plugin_name.as_str();
            match plugins.cdc(name) {
                Some(plugin) => Some(plugin),
                None => bail!(
                    ErrorKind::ConfigError,
                    "Incorrect value provided for cdc plugin",
                    unknown_plugin_detail(plugins, PluginKind::Cdc, name)
                ),
            }
        } else {
            None
        };

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Ok(Self {
            config,
            table_names,
            full_load_plugin,
            cdc_plugin,
            worker_registry,
            shutdown_tx,
            shutdown_rx,
            state: OperatorState::Idle,
            report: None,
        })
    }

    /// Sender of the termination request observed by [`Operator::execute`].
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    pub fn table_names(&self) -> &[TableName] {
        &self.table_names
    }

    /// Report of the last [`Operator::execute`] call.
    pub fn report(&self) -> Option<&OperatorReport> {
        self.report.as_ref()
    }

    /// Spawns the workers and supervises them until every one of them ended.
    ///
    /// Returns the aggregated errors of the failed or panicked workers, if any.
    pub async fn execute(&mut self) -> SiphonResult<OperatorReport> {
        if self.state != OperatorState::Idle {
            bail!(
                ErrorKind::InvalidState,
                "Operator already executed",
                format!("The operator is {}", self.state)
            );
        }

        let span = info_span!(
            "operator",
            load_type = %self.config.load_type,
            tables = self.table_names.len()
        );

        self.run().instrument(span).await
    }

    async fn run(&mut self) -> SiphonResult<OperatorReport> {
        self.state = OperatorState::Running;
        info!("operator started");

        let tick = self.config.supervision_interval();
        let root = PathBuf::from(&self.config.output_location);
        let mut pool = WorkerPool::new(self.worker_registry.clone());
        let (notifier, mut completion_rx) = CompletionNotifier::channel();
        let (workers_shutdown_tx, _) = create_shutdown_channel();

        if let Err(err) = self
            .spawn_workers(&root, &mut pool, &notifier, &workers_shutdown_tx)
            .await
        {
            error!(error = %err, "failed to start workers, terminating the ones already running");
            pool.terminate_all();
            while pool.join_next().await.is_some() {}
            self.state = OperatorState::Completed;

            return Err(err);
        }
        // Only workers hold notifiers now, the channel closes once they all ended.
        drop(notifier);

        info!(workers = pool.len(), "workers started");

        let mut report = OperatorReport::default();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completions_open = true;

        while !pool.is_empty() {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    report.terminated = true;
                    break;
                }
                Some(worker_report) = pool.join_next() => {
                    log_worker_report(&worker_report);
                    report.workers.push(worker_report);
                }
                completion = completion_rx.recv(), if completions_open => match completion {
                    Some(completion) => record_completion(&mut report, completion),
                    None => completions_open = false,
                },
                _ = ticker.tick() => {
                    debug!(live_workers = pool.live_workers().len(), "supervising workers");
                }
            }
        }

        if report.terminated {
            info!("termination requested, stopping workers");
            self.stop_workers(&mut pool, &workers_shutdown_tx, tick / 2, &mut report)
                .await;
        }

        while let Ok(completion) = completion_rx.try_recv() {
            record_completion(&mut report, completion);
        }

        self.state = if report.terminated {
            OperatorState::Terminated
        } else {
            OperatorState::Completed
        };
        self.report = Some(report.clone());

        let errors: Vec<SiphonError> = report
            .failed_workers()
            .filter_map(|worker| worker.outcome.error().cloned())
            .collect();

        info!(
            state = %self.state,
            workers = report.workers.len(),
            failed = errors.len(),
            "operator finished"
        );

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(report)
    }

    async fn spawn_workers(
        &self,
        root: &Path,
        pool: &mut WorkerPool,
        notifier: &CompletionNotifier,
        workers_shutdown_tx: &ShutdownTx,
    ) -> SiphonResult<()> {
        if let Some(plugin) = &self.full_load_plugin {
            for table_name in &self.table_names {
                let output_dir = root
                    .join(FULL_LOAD_DIRECTORY)
                    .join(table_name.as_path_token());
                tokio::fs::create_dir_all(&output_dir).await?;

                let task = FullLoadTask {
                    output_dir,
                    source: self.config.source.clone(),
                    table_name: table_name.clone(),
                    split_threshold: self.config.full_load.split_threshold,
                };
                FullLoadWorker::new(plugin.clone(), task, notifier.clone())
                    .spawn(pool)
                    .await;
            }
        }

        if let Some(plugin) = &self.cdc_plugin {
            let output_dir = root.join(CDC_DIRECTORY);
            tokio::fs::create_dir_all(&output_dir).await?;

            let task = CdcTask {
                output_dir,
                source: self.config.source.clone(),
                table_names: self.table_names.clone(),
                settings: self.config.cdc.clone(),
            };
            CdcWorker::new(plugin.clone(), task, workers_shutdown_tx.subscribe())
                .spawn(pool)
                .await;
        }

        Ok(())
    }

    /// Asks the workers to stop, gives them `grace_period`, then aborts the remaining ones.
    ///
    /// The grace period is half a supervision tick, so every worker has ended within one tick of
    /// the termination request.
    async fn stop_workers(
        &self,
        pool: &mut WorkerPool,
        workers_shutdown_tx: &ShutdownTx,
        grace_period: Duration,
        report: &mut OperatorReport,
    ) {
        if workers_shutdown_tx.shutdown().is_err() {
            debug!("no worker listens for shutdown requests");
        }

        let deadline = tokio::time::sleep(grace_period);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                worker_report = pool.join_next() => match worker_report {
                    Some(worker_report) => {
                        log_worker_report(&worker_report);
                        report.workers.push(worker_report);
                    }
                    None => break,
                },
            }
        }

        if pool.is_empty() {
            return;
        }

        warn!(
            workers = pool.len(),
            "workers still running after the grace period, terminating them"
        );
        pool.terminate_all();

        while let Some(worker_report) = pool.join_next().await {
            log_worker_report(&worker_report);
            report.workers.push(worker_report);
        }
    }
}

fn parse_table_names(raw_names: &[String]) -> SiphonResult<Vec<TableName>> {
    let mut seen = HashSet::new();
    let mut table_names = Vec::with_capacity(raw_names.len());

    for raw_name in raw_names {
        let table_name: TableName = raw_name.trim().parse()?;
        if !seen.insert(table_name.clone()) {
            bail!(
                ErrorKind::ConfigError,
                "Duplicate table name",
                format!("Table '{table_name}' is listed more than once")
            );
        }
        table_names.push(table_name);
    }

    Ok(table_names)
}

fn unknown_plugin_detail(plugins: &PluginRegistry, kind: PluginKind, name: &str) -> String {
    format!(
        "No {kind} plugin named `{name}` is registered, known {kind} plugins: [{}]",
        plugins.names(kind).join(", ")
    )
}

fn record_completion(report: &mut OperatorReport, completion: FullLoadCompletion) {
    info!(
        table = %completion.table_name,
        status = %completion.status,
        detail = completion.error.as_deref().unwrap_or(""),
        "full load completion received"
    );
    report.notifications.push(completion);
}

fn log_worker_report(report: &WorkerReport) {
    let table = report
        .table_name
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();

    match &report.outcome {
        WorkerOutcome::Completed | WorkerOutcome::Terminated => info!(
            worker = %report.name,
            kind = %report.kind,
            table = %table,
            outcome = report.outcome.as_str(),
            "worker ended"
        ),
        WorkerOutcome::Failed(err) | WorkerOutcome::Panicked(err) => error!(
            worker = %report.name,
            kind = %report.kind,
            table = %table,
            outcome = report.outcome.as_str(),
            error = %err,
            "worker ended"
        ),
    }
}
