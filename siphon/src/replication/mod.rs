//! Access to the source database: snapshot streams and the logical replication slot.

pub mod client;
pub mod decoding;
pub mod source;
