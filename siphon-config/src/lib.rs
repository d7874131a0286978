//! Configuration types and loading for the replication engine.
//!
//! Configuration values are passed explicitly into each component's constructor. Nothing in
//! this crate keeps process-wide state.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
