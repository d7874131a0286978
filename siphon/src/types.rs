use std::fmt;

pub use siphon_postgres::types::TableName;
pub use tokio_postgres::types::PgLsn;

/// Prefix of every worker name. The signal handler only terminates workers carrying it.
pub const RESERVED_WORKER_PREFIX: &str = "siphon_worker_";

/// Outcome reported through a completion notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    Success,
    Failure,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Success => "success",
            NotificationStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message sent once a full load of a table is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullLoadCompletion {
    pub status: NotificationStatus,
    pub table_name: TableName,
    /// Extra information, such as `Table was empty`, or the error text of a failure.
    pub error: Option<String>,
}
