//! Named implementations of the two worker capabilities: snapshotting a table and following a
//! change stream. Jobs refer to them by name and resolve them through the
//! [`registry::PluginRegistry`].

pub mod base;
pub mod postgres;
pub mod registry;
