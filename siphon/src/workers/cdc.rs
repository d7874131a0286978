use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use metrics::counter;
use siphon_config::shared::SlotRetention;
use siphon_postgres::slots::validate_slot_name;
use tokio::sync::watch;
use tracing::{field, info, info_span, warn};

use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested, wait_for_shutdown};
use crate::error::SiphonResult;
use crate::metrics::{
    SIPHON_CDC_CYCLE_FAILURES_TOTAL, SIPHON_CDC_CYCLES_CONFIRMED_TOTAL,
    SIPHON_CDC_MALFORMED_CHANGES_TOTAL, SIPHON_CDC_RECORDS_WRITTEN_TOTAL, TABLE_NAME_LABEL,
};
use crate::plugins::base::{CdcPlugin, CdcTask};
use crate::replication::decoding::decode_changes;
use crate::replication::source::{SlotSource, ensure_slot};
use crate::sink::cdc::CdcFileSink;
use crate::types::TableName;
use crate::workers::base::{WorkerHandle, WorkerKind};
use crate::workers::pool::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcStatus {
    NotStarted,
    Started,
    Running,
    Stopped,
}

impl CdcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CdcStatus::NotStarted => "not started",
            CdcStatus::Started => "in progress - started",
            CdcStatus::Running => "running",
            CdcStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for CdcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poll loop consuming a wal2json slot into per-table change files.
///
/// Every cycle peeks the pending changes, writes one file per table that has changes and only
/// then consumes the peeked changes from the slot. A cycle that fails before consuming leaves
/// the changes in the slot, so they are written again by a later cycle.
#[derive(Debug)]
pub struct CdcJob {
    task: CdcTask,
    status_tx: watch::Sender<CdcStatus>,
}

impl CdcJob {
    pub fn new(task: CdcTask) -> Self {
        let (status_tx, _) = watch::channel(CdcStatus::NotStarted);

        Self { task, status_tx }
    }

    pub fn status(&self) -> CdcStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CdcStatus> {
        self.status_tx.subscribe()
    }

    fn set_status(&self, status: CdcStatus) {
        info!(status = %status, "cdc status changed");
        self.status_tx.send_replace(status);
    }

    /// Runs cycles until `shutdown_rx` fires or too many consecutive cycles fail.
    ///
    /// A shutdown request never interrupts a cycle, only the wait between two cycles.
    pub async fn run<S>(&self, source: &S, mut shutdown_rx: ShutdownRx) -> SiphonResult<()>
    where
        S: SlotSource + ?Sized,
    {
        let settings = &self.task.settings;
        let slot_name = settings.slot_name.as_str();
        validate_slot_name(slot_name)?;

        self.set_status(CdcStatus::Started);

        ensure_slot(source, slot_name, settings.slot_creation).await?;

        let table_names = if self.task.table_names.is_empty() {
            let discovered = source.list_tables().await?;
            info!(tables = discovered.len(), "no tables configured, following every user table");
            discovered
        } else {
            self.task.table_names.clone()
        };
        if table_names.is_empty() {
            warn!("source has no user table, no change will be written");
        }
        let table_set: HashSet<TableName> = table_names.iter().cloned().collect();

        let mut sinks = HashMap::new();
        let mut consecutive_failures = 0u32;

        self.set_status(CdcStatus::Running);

        loop {
            if is_shutdown_requested(&shutdown_rx) {
                break;
            }

            match self
                .run_cycle(source, &table_names, &table_set, &mut sinks)
                .await
            {
                Ok(()) => consecutive_failures = 0,
                Err(err) => {
                    counter!(SIPHON_CDC_CYCLE_FAILURES_TOTAL).increment(1);
                    consecutive_failures += 1;
                    warn!(
                        error = %err,
                        consecutive_failures,
                        "cdc iteration failed, changes will be replayed"
                    );

                    if consecutive_failures >= settings.max_consecutive_cycle_failures {
                        self.set_status(CdcStatus::Stopped);
                        return Err(err);
                    }
                }
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(settings.poll_interval()) => {}
            }
        }

        if settings.slot_retention == SlotRetention::Drop {
            source.drop_slot(slot_name).await?;
        }

        self.set_status(CdcStatus::Stopped);
        info!("cdc worker stopped");

        Ok(())
    }

    async fn run_cycle<S>(
        &self,
        source: &S,
        table_names: &[TableName],
        table_set: &HashSet<TableName>,
        sinks: &mut HashMap<TableName, CdcFileSink>,
    ) -> SiphonResult<()>
    where
        S: SlotSource + ?Sized,
    {
        info!("cdc iteration started");

        let slot_name = self.task.settings.slot_name.as_str();
        let rows = source.peek_changes(slot_name, table_names).await?;
        let batch = decode_changes(&rows, table_set);
        if batch.malformed > 0 {
            counter!(SIPHON_CDC_MALFORMED_CHANGES_TOTAL).increment(batch.malformed as u64);
        }

        if !batch.is_empty() {
            info!(tables = ?batch.record_counts(), "tables with changes");
        }

        for (table_name, records) in &batch.groups {
            if !sinks.contains_key(table_name) {
                let sink = CdcFileSink::open_for_table(table_name, &self.task.output_dir).await?;
                sinks.insert(table_name.clone(), sink);
            }

            if let Some(sink) = sinks.get_mut(table_name) {
                sink.write_batch(records).await?;
                counter!(
                    SIPHON_CDC_RECORDS_WRITTEN_TOTAL,
                    TABLE_NAME_LABEL => table_name.to_string(),
                )
                .increment(records.len() as u64);
            }
        }

        if let Some(max_lsn) = batch.max_lsn {
            source
                .confirm_changes(slot_name, max_lsn, table_names)
                .await?;
            counter!(SIPHON_CDC_CYCLES_CONFIRMED_TOTAL).increment(1);
        }

        Ok(())
    }
}

/// Runs a [`CdcPlugin`] as a pooled worker.
#[derive(Debug)]
pub struct CdcWorker {
    plugin: Arc<dyn CdcPlugin>,
    task: CdcTask,
    shutdown_rx: ShutdownRx,
}

impl CdcWorker {
    pub fn new(plugin: Arc<dyn CdcPlugin>, task: CdcTask, shutdown_rx: ShutdownRx) -> Self {
        Self {
            plugin,
            task,
            shutdown_rx,
        }
    }

    pub async fn spawn(self, pool: &mut WorkerPool) -> WorkerHandle {
        let span = info_span!(
            "cdc_worker",
            worker = field::Empty,
            slot = %self.task.settings.slot_name,
            plugin = self.plugin.name()
        );

        let future = async move {
            info!(tables = self.task.table_names.len(), "starting cdc worker");

            self.plugin.execute(self.task, self.shutdown_rx).await
        };

        pool.spawn(WorkerKind::Cdc, None, span, future).await
    }
}
