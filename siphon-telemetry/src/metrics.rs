use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to install the Prometheus exporter on `{address}`: {source}")]
    Install {
        address: SocketAddr,
        #[source]
        source: BuildError,
    },
}

/// Installs the global metrics recorder and serves it for scraping on `listen_address`.
///
/// Outside a tokio runtime the exporter runs on its own background thread.
pub fn init_metrics(listen_address: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(listen_address)
        .install()
        .map_err(|source| MetricsError::Install {
            address: listen_address,
            source,
        })
}
