use std::fmt;

use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::error::{ErrorKind, SiphonError};
use crate::types::{RESERVED_WORKER_PREFIX, TableName};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    FullLoad,
    Cdc,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::FullLoad => "full_load",
            WorkerKind::Cdc => "cdc",
        }
    }

    /// Error kind reported when a worker of this kind panics.
    pub fn panic_error_kind(&self) -> ErrorKind {
        match self {
            WorkerKind::FullLoad => ErrorKind::FullLoadWorkerPanic,
            WorkerKind::Cdc => ErrorKind::CdcWorkerPanic,
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique name tag of a worker: `<reserved prefix><kind>_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerName(String);

impl WorkerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn generate(kind: WorkerKind) -> Self {
        Self(format!(
            "{RESERVED_WORKER_PREFIX}{kind}_{}",
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a running worker task, used to check liveness and to force termination.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    name: WorkerName,
    kind: WorkerKind,
    table_name: Option<TableName>,
    abort_handle: AbortHandle,
}

impl WorkerHandle {
    pub fn new(
        name: WorkerName,
        kind: WorkerKind,
        table_name: Option<TableName>,
        abort_handle: AbortHandle,
    ) -> Self {
        Self {
            name,
            kind,
            table_name,
            abort_handle,
        }
    }

    pub fn name(&self) -> &WorkerName {
        &self.name
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn table_name(&self) -> Option<&TableName> {
        self.table_name.as_ref()
    }

    pub fn is_alive(&self) -> bool {
        !self.abort_handle.is_finished()
    }

    /// Aborts the task at its next suspension point.
    pub fn terminate(&self) {
        self.abort_handle.abort();
    }
}

/// How a worker task ended.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Completed,
    Failed(SiphonError),
    /// The task was aborted before it finished.
    Terminated,
    Panicked(SiphonError),
}

impl WorkerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerOutcome::Completed => "completed",
            WorkerOutcome::Failed(_) => "failed",
            WorkerOutcome::Terminated => "terminated",
            WorkerOutcome::Panicked(_) => "panicked",
        }
    }

    pub fn error(&self) -> Option<&SiphonError> {
        match self {
            WorkerOutcome::Failed(err) | WorkerOutcome::Panicked(err) => Some(err),
            WorkerOutcome::Completed | WorkerOutcome::Terminated => None,
        }
    }
}

/// Exit record of one worker.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub name: WorkerName,
    pub kind: WorkerKind,
    pub table_name: Option<TableName>,
    pub outcome: WorkerOutcome,
}
