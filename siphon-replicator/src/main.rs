//! Replicator binary.
//!
//! Loads the job configuration, installs tracing and metrics, and runs the job under the retry
//! supervisor until it completes, fails for good or a termination signal arrives.

use std::process::ExitCode;

use siphon_telemetry::metrics::init_metrics;
use siphon_telemetry::tracing::init_tracing;
use tracing::{error, info};

use crate::config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> ReplicatorResult<()> {
    let replicator_config = load_replicator_config()?;

    let _log_flusher = init_tracing(
        env!("CARGO_BIN_NAME"),
        replicator_config.logging.directory.as_deref(),
    )
    .map_err(ReplicatorError::telemetry)?;

    if let Some(listen_address) = replicator_config.metrics.listen_address {
        init_metrics(listen_address).map_err(ReplicatorError::telemetry)?;
        info!(%listen_address, "serving metrics");
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_replicator_with_config(replicator_config))
}
