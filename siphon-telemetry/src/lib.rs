//! Tracing and metrics setup shared by the replicator binary and the tests.

pub mod metrics;
pub mod tracing;
