use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{SourceConfig, ValidationError};

/// Which phases a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadType {
    #[serde(rename = "Full_Load")]
    FullLoad,
    #[serde(rename = "CDC")]
    Cdc,
    #[serde(rename = "Full_Load_And_CDC")]
    FullLoadAndCdc,
}

impl LoadType {
    pub fn includes_full_load(&self) -> bool {
        matches!(self, LoadType::FullLoad | LoadType::FullLoadAndCdc)
    }

    pub fn includes_cdc(&self) -> bool {
        matches!(self, LoadType::Cdc | LoadType::FullLoadAndCdc)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadType::FullLoad => "Full_Load",
            LoadType::Cdc => "CDC",
            LoadType::FullLoadAndCdc => "Full_Load_And_CDC",
        }
    }
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Full_Load" => Ok(LoadType::FullLoad),
            "CDC" => Ok(LoadType::Cdc),
            "Full_Load_And_CDC" => Ok(LoadType::FullLoadAndCdc),
            other => Err(ValidationError::InvalidFieldValue {
                field: "job.load_type".to_string(),
                constraint: format!(
                    "`{other}` is not one of `Full_Load`, `CDC`, `Full_Load_And_CDC`"
                ),
            }),
        }
    }
}

/// What the CDC worker does when the replication slot does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotCreation {
    #[default]
    CreateIfMissing,
    RequireExisting,
}

/// What happens to the replication slot once the CDC worker stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRetention {
    #[default]
    Retain,
    Drop,
}

/// Settings of the snapshot phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullLoadConfig {
    /// Maximum number of rows per output shard.
    #[serde(default = "default_split_threshold")]
    pub split_threshold: u64,
}

impl FullLoadConfig {
    pub const DEFAULT_SPLIT_THRESHOLD: u64 = 1_000_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.split_threshold == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "job.full_load.split_threshold".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for FullLoadConfig {
    fn default() -> Self {
        Self {
            split_threshold: default_split_threshold(),
        }
    }
}

/// Settings of the streaming phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdcConfig {
    #[serde(default = "default_slot_name")]
    pub slot_name: String,
    /// Seconds between two polls of the slot. Fractions are allowed.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
    #[serde(default)]
    pub slot_creation: SlotCreation,
    #[serde(default)]
    pub slot_retention: SlotRetention,
    /// Number of failed cycles in a row after which the worker gives up.
    #[serde(default = "default_max_consecutive_cycle_failures")]
    pub max_consecutive_cycle_failures: u32,
}

impl CdcConfig {
    pub const DEFAULT_SLOT_NAME: &'static str = "siphon_slot";

    pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;

    pub const DEFAULT_MAX_CONSECUTIVE_CYCLE_FAILURES: u32 = 5;

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.slot_name.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "job.cdc.slot_name".to_string(),
                constraint: "cannot be empty".to_string(),
            });
        }

        if self.poll_interval_secs <= 0.0
            || Duration::try_from_secs_f64(self.poll_interval_secs).is_err()
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "job.cdc.poll_interval_secs".to_string(),
                constraint: "must be a positive, representable number of seconds".to_string(),
            });
        }

        if self.max_consecutive_cycle_failures == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "job.cdc.max_consecutive_cycle_failures".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for CdcConfig {
    fn default() -> Self {
        Self {
            slot_name: default_slot_name(),
            poll_interval_secs: default_poll_interval_secs(),
            slot_creation: SlotCreation::default(),
            slot_retention: SlotRetention::default(),
            max_consecutive_cycle_failures: default_max_consecutive_cycle_failures(),
        }
    }
}

/// A single replication job: what to copy, from where, to where and with which plugins.
///
/// This intentionally does not implement [`Serialize`] since [`SourceConfig`] holds a secret.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub source: SourceConfig,
    pub load_type: LoadType,
    /// Tables as `schema.table`. An unqualified name refers to the `public` schema.
    ///
    /// May be empty for a CDC-only job, in which case every user table is followed.
    #[serde(default)]
    pub table_names: Vec<String>,
    #[serde(default = "default_full_load_plugin_name")]
    pub full_load_plugin_name: String,
    #[serde(default = "default_cdc_plugin_name")]
    pub cdc_plugin_name: String,
    /// Root directory receiving `full_load/` and `cdc/` output.
    pub output_location: String,
    /// How many times a failed run is started again before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Tick at which the operator checks worker liveness.
    #[serde(default = "default_supervision_interval_ms")]
    pub supervision_interval_ms: u64,
    #[serde(default)]
    pub full_load: FullLoadConfig,
    #[serde(default)]
    pub cdc: CdcConfig,
}

impl JobConfig {
    pub const DEFAULT_FULL_LOAD_PLUGIN_NAME: &'static str = "PgDefaultFullLoadPlugin";

    pub const DEFAULT_CDC_PLUGIN_NAME: &'static str = "PgDefaultCDCPlugin";

    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

    pub const DEFAULT_SUPERVISION_INTERVAL_MS: u64 = 2_000;

    /// Builds a job with default tuning for the given essentials.
    pub fn new(
        source: SourceConfig,
        load_type: LoadType,
        table_names: Vec<String>,
        output_location: impl Into<String>,
    ) -> Self {
        Self {
            source,
            load_type,
            table_names,
            full_load_plugin_name: default_full_load_plugin_name(),
            cdc_plugin_name: default_cdc_plugin_name(),
            output_location: output_location.into(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            supervision_interval_ms: default_supervision_interval_ms(),
            full_load: FullLoadConfig::default(),
            cdc: CdcConfig::default(),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn supervision_interval(&self) -> Duration {
        Duration::from_millis(self.supervision_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;

        if self.output_location.trim().is_empty() {
            return Err(ValidationError::EmptyOutputLocation);
        }

        if self.load_type.includes_full_load() && self.table_names.is_empty() {
            return Err(ValidationError::EmptyTableNames(
                self.load_type.to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for table_name in &self.table_names {
            if table_name.trim().is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field: "job.table_names".to_string(),
                    constraint: "table names cannot be empty".to_string(),
                });
            }

            if !seen.insert(table_name.trim()) {
                return Err(ValidationError::DuplicateTableName(table_name.clone()));
            }
        }

        if self.load_type.includes_full_load() && self.full_load_plugin_name.trim().is_empty() {
            return Err(ValidationError::MissingPluginName {
                field: "job.full_load_plugin_name",
                load_type: self.load_type.to_string(),
            });
        }

        if self.load_type.includes_cdc() && self.cdc_plugin_name.trim().is_empty() {
            return Err(ValidationError::MissingPluginName {
                field: "job.cdc_plugin_name",
                load_type: self.load_type.to_string(),
            });
        }

        if self.supervision_interval_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "job.supervision_interval_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        self.full_load.validate()?;
        self.cdc.validate()
    }
}

fn default_split_threshold() -> u64 {
    FullLoadConfig::DEFAULT_SPLIT_THRESHOLD
}

fn default_slot_name() -> String {
    CdcConfig::DEFAULT_SLOT_NAME.to_string()
}

fn default_poll_interval_secs() -> f64 {
    CdcConfig::DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_consecutive_cycle_failures() -> u32 {
    CdcConfig::DEFAULT_MAX_CONSECUTIVE_CYCLE_FAILURES
}

fn default_full_load_plugin_name() -> String {
    JobConfig::DEFAULT_FULL_LOAD_PLUGIN_NAME.to_string()
}

fn default_cdc_plugin_name() -> String {
    JobConfig::DEFAULT_CDC_PLUGIN_NAME.to_string()
}

fn default_max_retries() -> u32 {
    JobConfig::DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    JobConfig::DEFAULT_RETRY_DELAY_MS
}

fn default_supervision_interval_ms() -> u64 {
    JobConfig::DEFAULT_SUPERVISION_INTERVAL_MS
}
