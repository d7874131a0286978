use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;
use siphon_config::shared::{CdcConfig, SourceConfig};
use tokio::sync::mpsc;
use tracing::warn;

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::SiphonResult;
use crate::types::{FullLoadCompletion, NotificationStatus, TableName};

/// Input of a full load of one table.
#[derive(Debug, Clone)]
pub struct FullLoadTask {
    /// Directory owned by this table. Wiped unless it holds a completed load.
    pub output_dir: PathBuf,
    pub source: SourceConfig,
    pub table_name: TableName,
    /// Maximum number of rows per shard.
    pub split_threshold: u64,
}

/// Input of a change data capture run.
#[derive(Debug, Clone)]
pub struct CdcTask {
    /// Root of the per-table change directories.
    pub output_dir: PathBuf,
    pub source: SourceConfig,
    /// Tables to follow. Empty means every user table of the source.
    pub table_names: Vec<TableName>,
    pub settings: CdcConfig,
}

/// Sending half of the completion channel handed to full-load plugins.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    tx: mpsc::UnboundedSender<FullLoadCompletion>,
}

impl CompletionNotifier {
    pub fn new(tx: mpsc::UnboundedSender<FullLoadCompletion>) -> Self {
        Self { tx }
    }

    /// Creates a notifier together with the receiver of its notifications.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FullLoadCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();

        (Self::new(tx), rx)
    }

    pub fn success(&self, table_name: &TableName, detail: Option<&str>) {
        self.notify(NotificationStatus::Success, table_name, detail);
    }

    pub fn failure(&self, table_name: &TableName, error: &str) {
        self.notify(NotificationStatus::Failure, table_name, Some(error));
    }

    fn notify(&self, status: NotificationStatus, table_name: &TableName, detail: Option<&str>) {
        let completion = FullLoadCompletion {
            status,
            table_name: table_name.clone(),
            error: detail.map(str::to_string),
        };

        if self.tx.send(completion).is_err() {
            warn!(table = %table_name, %status, "completion receiver dropped, notification lost");
        }
    }
}

/// Copies the current content of one table into its output directory.
///
/// Implementations notify exactly once on success through the notifier. Failures are returned.
#[async_trait]
pub trait FullLoadPlugin: Debug + Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, task: FullLoadTask, notifier: CompletionNotifier) -> SiphonResult<()>;
}

/// Streams row changes into per-table files until `shutdown_rx` fires.
#[async_trait]
pub trait CdcPlugin: Debug + Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, task: CdcTask, shutdown_rx: ShutdownRx) -> SiphonResult<()>;
}
