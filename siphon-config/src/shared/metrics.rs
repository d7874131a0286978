use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Prometheus exporter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address serving the `/metrics` endpoint. Metrics are not exported when `None`.
    #[serde(default)]
    pub listen_address: Option<SocketAddr>,
}
