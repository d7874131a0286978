use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use metrics::counter;
use tokio::sync::watch;
use tracing::{field, info, info_span, warn};

use crate::error::SiphonResult;
use crate::metrics::{
    SIPHON_FULL_LOAD_ROWS_COPIED_TOTAL, SIPHON_FULL_LOAD_SHARDS_WRITTEN_TOTAL, TABLE_NAME_LABEL,
};
use crate::plugins::base::{CompletionNotifier, FullLoadPlugin, FullLoadTask};
use crate::replication::source::SnapshotSource;
use crate::sink::full_load::{BulkFileWriter, finalize_single_file, split_into_shards};
use crate::sink::{is_marked_complete, mark_complete, reset_directory};
use crate::workers::base::{WorkerHandle, WorkerKind};
use crate::workers::pool::WorkerPool;

/// Progress of a full load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullLoadStatus {
    NotStarted,
    Started,
    BulkFileCreated,
    SmallerFilesCreated,
    Completed,
    CompletedNoRecords,
}

impl FullLoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FullLoadStatus::NotStarted => "not started",
            FullLoadStatus::Started => "in progress - started",
            FullLoadStatus::BulkFileCreated => "in progress - bulk file created",
            FullLoadStatus::SmallerFilesCreated => "in progress - smaller files created",
            FullLoadStatus::Completed => "completed",
            FullLoadStatus::CompletedNoRecords => "completed - no records found",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FullLoadStatus::Completed | FullLoadStatus::CompletedNoRecords
        )
    }
}

impl fmt::Display for FullLoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one table into its output directory.
#[derive(Debug)]
pub struct FullLoadJob {
    task: FullLoadTask,
    status_tx: watch::Sender<FullLoadStatus>,
}

impl FullLoadJob {
    pub fn new(task: FullLoadTask) -> Self {
        let (status_tx, _) = watch::channel(FullLoadStatus::NotStarted);

        Self { task, status_tx }
    }

    pub fn status(&self) -> FullLoadStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<FullLoadStatus> {
        self.status_tx.subscribe()
    }

    fn set_status(&self, status: FullLoadStatus) {
        info!(table = %self.task.table_name, status = %status, "full load status changed");
        self.status_tx.send_replace(status);
    }

    /// Copies the table from `source` unless its directory is already marked complete, then
    /// notifies success once.
    pub async fn execute<S>(&self, source: &S, notifier: &CompletionNotifier) -> SiphonResult<()>
    where
        S: SnapshotSource + ?Sized,
    {
        let table_name = &self.task.table_name;
        let directory = self.task.output_dir.as_path();

        if is_marked_complete(directory).await? {
            info!(table = %table_name, "table already loaded, skipping");
            self.status_tx.send_replace(FullLoadStatus::Completed);
            notifier.success(table_name, Some("Table already loaded"));

            return Ok(());
        }

        self.set_status(FullLoadStatus::Started);
        reset_directory(directory).await?;

        let mut writer = BulkFileWriter::create(directory, table_name).await?;
        let mut stream = source.copy_table(table_name).await?;
        while let Some(chunk) = stream.next().await {
            writer.write_chunk(&chunk?).await?;
        }
        let bulk = writer.finish().await?;
        let rows = bulk.rows;
        self.set_status(FullLoadStatus::BulkFileCreated);

        let shards =
            split_into_shards(&bulk, directory, table_name, self.task.split_threshold).await?;
        let shards = finalize_single_file(bulk, directory, table_name, shards).await?;
        self.set_status(FullLoadStatus::SmallerFilesCreated);

        mark_complete(directory).await?;

        counter!(
            SIPHON_FULL_LOAD_ROWS_COPIED_TOTAL,
            TABLE_NAME_LABEL => table_name.to_string(),
        )
        .increment(rows);
        counter!(
            SIPHON_FULL_LOAD_SHARDS_WRITTEN_TOTAL,
            TABLE_NAME_LABEL => table_name.to_string(),
        )
        .increment(shards.len() as u64);

        info!(table = %table_name, rows, shards = shards.len(), "full load finished");

        if rows == 0 {
            self.set_status(FullLoadStatus::CompletedNoRecords);
            notifier.success(table_name, Some("Table was empty"));
        } else {
            self.set_status(FullLoadStatus::Completed);
            notifier.success(table_name, None);
        }

        Ok(())
    }
}

/// Runs a [`FullLoadPlugin`] for one table as a pooled worker.
#[derive(Debug)]
pub struct FullLoadWorker {
    plugin: Arc<dyn FullLoadPlugin>,
    task: FullLoadTask,
    notifier: CompletionNotifier,
}

impl FullLoadWorker {
    pub fn new(
        plugin: Arc<dyn FullLoadPlugin>,
        task: FullLoadTask,
        notifier: CompletionNotifier,
    ) -> Self {
        Self {
            plugin,
            task,
            notifier,
        }
    }

    /// Starts the worker. A failing plugin also produces a failure notification.
    pub async fn spawn(self, pool: &mut WorkerPool) -> WorkerHandle {
        let table_name = self.task.table_name.clone();
        let span = info_span!(
            "full_load_worker",
            worker = field::Empty,
            table = %table_name,
            plugin = self.plugin.name()
        );

        let future = {
            let table_name = table_name.clone();
            async move {
                info!("starting full load worker");

                let result = self.plugin.execute(self.task, self.notifier.clone()).await;
                if let Err(err) = &result {
                    warn!(error = %err, "full load failed");
                    self.notifier.failure(&table_name, &err.to_string());
                }

                result
            }
        };

        pool.spawn(WorkerKind::FullLoad, Some(table_name), span, future)
            .await
    }
}
