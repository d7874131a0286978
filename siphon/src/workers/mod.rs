//! Workers run one unit of work each on their own tokio task: the snapshot of a table or the
//! change stream of a job.

pub mod base;
pub mod cdc;
pub mod full_load;
pub mod policy;
pub mod pool;
pub mod registry;
