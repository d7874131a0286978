//! Helpers for exercising the engine without a database.
//!
//! [`memory`] holds in-memory implementations of the source traits, [`plugins`] wraps them and
//! a few misbehaving implementations as plugins, [`notify`] bounds waits in tests.

use std::path::Path;

use siphon_config::shared::{JobConfig, LoadType, SourceConfig};

pub mod memory;
pub mod notify;
pub mod plugins;

/// Connection string accepted by validation. Nothing ever connects to it in-memory.
pub const TEST_CONNECTION_STRING: &str = "host=localhost user=postgres dbname=postgres";

/// Builds a job writing into `output_location` with a fast supervision tick, no retry delay
/// and a short CDC poll interval.
pub fn test_job_config(load_type: LoadType, table_names: &[&str], output_location: &Path) -> JobConfig {
    let mut config = JobConfig::new(
        SourceConfig::new(TEST_CONNECTION_STRING),
        load_type,
        table_names.iter().map(|name| name.to_string()).collect(),
        output_location.to_string_lossy(),
    );
    config.supervision_interval_ms = 50;
    config.retry_delay_ms = 0;
    config.cdc.poll_interval_secs = 0.02;

    config
}
