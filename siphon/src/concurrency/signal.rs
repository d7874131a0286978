use std::fmt;

use tracing::{info, warn};

use crate::error::SiphonResult;
use crate::types::RESERVED_WORKER_PREFIX;
use crate::workers::registry::WorkerRegistry;

/// Process signal that requested termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Waits for SIGINT or, on unix, SIGTERM.
pub async fn wait_for_termination_signal() -> SiphonResult<TerminationSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok(TerminationSignal::Interrupt)
            }
            _ = sigterm.recv() => Ok(TerminationSignal::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(TerminationSignal::Interrupt)
    }
}

/// Force-terminates every tracked worker whose name starts with the reserved prefix and
/// returns the names of the terminated workers.
pub async fn terminate_tracked_workers(registry: &WorkerRegistry) -> Vec<String> {
    let terminated = registry.terminate_with_prefix(RESERVED_WORKER_PREFIX).await;

    if terminated.is_empty() {
        warn!("no running worker to terminate");
    }
    for name in &terminated {
        info!(worker = %name, "worker terminated");
    }

    terminated
}

/// Waits for a termination signal, then terminates all tracked workers.
///
/// Returning from this function means the process should exit successfully.
pub async fn handle_termination_signals(registry: WorkerRegistry) -> SiphonResult<TerminationSignal> {
    let signal = wait_for_termination_signal().await?;
    info!(%signal, "termination signal received, terminating workers");

    terminate_tracked_workers(&registry).await;

    Ok(signal)
}
