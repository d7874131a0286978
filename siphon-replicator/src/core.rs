use siphon::concurrency::signal::handle_termination_signals;
use siphon::operator::{Operator, OperatorReport};
use siphon::plugins::registry::{PluginKind, PluginRegistry};
use siphon::retry::RetrySupervisor;
use siphon::workers::registry::WorkerRegistry;
use siphon_config::shared::{JobConfig, ReplicatorConfig};
use tracing::{debug, info, warn};

use crate::error::ReplicatorResult;

/// Runs the configured job until it completes or a termination signal arrives.
///
/// A failed run is started again with a fresh operator by the retry supervisor. A termination
/// signal force-stops every tracked worker and is a successful exit.
pub async fn start_replicator_with_config(
    replicator_config: ReplicatorConfig,
) -> ReplicatorResult<()> {
    info!("starting replicator service");

    let job_config = replicator_config.job;
    log_job_config(&job_config);

    let plugins = PluginRegistry::with_known();
    log_plugins(&plugins);

    let worker_registry = WorkerRegistry::new();
    let supervisor = RetrySupervisor::from_config(&job_config);

    let run = supervisor.run(|| {
        let job_config = job_config.clone();
        let plugins = plugins.clone();
        let worker_registry = worker_registry.clone();
        async move {
            let mut operator = Operator::new(job_config, &plugins, worker_registry)?;
            operator.execute().await
        }
    });

    tokio::select! {
        result = run => {
            let report = result?;
            log_report(&report);
            info!("replicator service completed");
        }
        result = handle_termination_signals(worker_registry.clone()) => {
            let signal = result?;
            info!(%signal, "replicator service stopped by signal");
        }
    }

    Ok(())
}

fn log_job_config(config: &JobConfig) {
    debug!(
        load_type = %config.load_type,
        table_names = ?config.table_names,
        output_location = config.output_location,
        full_load_plugin = config.full_load_plugin_name,
        cdc_plugin = config.cdc_plugin_name,
        max_retries = config.max_retries,
        retry_delay_ms = config.retry_delay_ms,
        tls_enabled = config.source.tls.enabled,
        "using job config"
    );
    debug!(
        split_threshold = config.full_load.split_threshold,
        slot_name = config.cdc.slot_name,
        poll_interval_secs = config.cdc.poll_interval_secs,
        slot_creation = ?config.cdc.slot_creation,
        slot_retention = ?config.cdc.slot_retention,
        "using phase config"
    );
}

fn log_plugins(plugins: &PluginRegistry) {
    for kind in [PluginKind::FullLoad, PluginKind::Cdc] {
        info!(kind = %kind, plugins = ?plugins.names(kind), "registered plugins");
    }
}

fn log_report(report: &OperatorReport) {
    info!(
        workers = report.workers.len(),
        notifications = report.notifications.len(),
        terminated = report.terminated,
        "job finished"
    );

    for notification in &report.notifications {
        if let Some(detail) = &notification.error {
            warn!(
                table = %notification.table_name,
                status = %notification.status,
                detail,
                "table completed with detail"
            );
        }
    }
}
