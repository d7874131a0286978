use serde::Deserialize;

use crate::Config;
use crate::shared::{JobConfig, LoggingConfig, MetricsConfig, ValidationError};

/// Complete configuration of the replicator binary.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking the source
/// credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatorConfig {
    pub job: JobConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ReplicatorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.job.validate()
    }
}

impl Config for ReplicatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["job.table_names"];
}
