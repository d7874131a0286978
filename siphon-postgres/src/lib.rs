//! Postgres specific value types shared by the replication engine.

pub mod slots;
#[cfg(feature = "test-utils")]
pub mod tokio;
pub mod types;
