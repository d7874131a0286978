use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where log output goes in addition to stdout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving daily rolling log files. Stdout only when `None`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}
