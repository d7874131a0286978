use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("Failed to create log directory `{path}`: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to install the global tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber: human readable output on stdout and, when `log_directory`
/// is given, a daily rolling `<app_name>.log` file in it.
///
/// The returned guard flushes the file writer when dropped and must live as long as the
/// process logs.
pub fn init_tracing(
    app_name: &str,
    log_directory: Option<&Path>,
) -> Result<Option<WorkerGuard>, TracingError> {
    let Some(log_directory) = log_directory else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer())
            .try_init()?;

        return Ok(None);
    };

    std::fs::create_dir_all(log_directory).map_err(|source| TracingError::LogDirectory {
        path: log_directory.to_path_buf(),
        source,
    })?;

    let file_appender = tracing_appender::rolling::daily(log_directory, format!("{app_name}.log"));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()?;

    Ok(Some(guard))
}

/// Installs a subscriber writing through the test harness when `ENABLE_TRACING` is set.
///
/// Safe to call from every test, only the first call has an effect.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    if std::env::var_os("ENABLE_TRACING").is_none() {
        return;
    }

    INIT.call_once(|| {
        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
