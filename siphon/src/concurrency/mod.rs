//! Coordination between the operator, its workers and the process.
//!
//! [`shutdown`] carries the cooperative stop request from the operator to workers and from
//! callers to the operator. [`signal`] turns SIGINT/SIGTERM into a forced termination of every
//! tracked worker.

pub mod shutdown;
pub mod signal;
