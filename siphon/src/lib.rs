//! Full-load and change data capture replication from Postgres into files.
//!
//! An [`operator::Operator`] runs one job: a snapshot worker per table, a single CDC worker
//! following a wal2json logical replication slot, or both. Workers write through the
//! [`sink`] module and are looked up by name in a [`plugins::registry::PluginRegistry`].
//! [`retry::run_with_retries`] restarts failed runs and [`concurrency::signal`] force-stops
//! tracked workers on SIGINT/SIGTERM.

pub mod concurrency;
pub mod error;
mod macros;
pub mod metrics;
pub mod operator;
pub mod plugins;
pub mod replication;
pub mod retry;
pub mod sink;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
