//! Shared configuration types for replication jobs.

mod base;
mod connection;
mod job;
mod logging;
mod metrics;
mod replicator;

pub use base::ValidationError;
pub use connection::{SourceConfig, TlsConfig};
pub use job::{CdcConfig, FullLoadConfig, JobConfig, LoadType, SlotCreation, SlotRetention};
pub use logging::LoggingConfig;
pub use metrics::MetricsConfig;
pub use replicator::ReplicatorConfig;
