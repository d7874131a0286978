use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, SiphonResult};
use crate::plugins::base::{CdcPlugin, CdcTask, CompletionNotifier, FullLoadPlugin, FullLoadTask};
use crate::siphon_error;
use crate::test_utils::memory::{MemorySlotSource, MemorySnapshotSource};
use crate::workers::cdc::CdcJob;
use crate::workers::full_load::FullLoadJob;

/// Full load from a [`MemorySnapshotSource`].
#[derive(Debug, Clone)]
pub struct MemoryFullLoadPlugin {
    source: MemorySnapshotSource,
}

impl MemoryFullLoadPlugin {
    pub const NAME: &'static str = "MemoryFullLoadPlugin";

    pub fn new(source: MemorySnapshotSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl FullLoadPlugin for MemoryFullLoadPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, task: FullLoadTask, notifier: CompletionNotifier) -> SiphonResult<()> {
        FullLoadJob::new(task).execute(&self.source, &notifier).await
    }
}

/// Change capture from a [`MemorySlotSource`].
#[derive(Debug, Clone)]
pub struct MemoryCdcPlugin {
    source: MemorySlotSource,
}

impl MemoryCdcPlugin {
    pub const NAME: &'static str = "MemoryCdcPlugin";

    pub fn new(source: MemorySlotSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl CdcPlugin for MemoryCdcPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, task: CdcTask, shutdown_rx: ShutdownRx) -> SiphonResult<()> {
        CdcJob::new(task).run(&self.source, shutdown_rx).await
    }
}

/// Full load failing with a fixed error kind and counting its invocations.
#[derive(Debug, Clone)]
pub struct FailingFullLoadPlugin {
    kind: ErrorKind,
    calls: Arc<AtomicUsize>,
}

impl FailingFullLoadPlugin {
    pub const NAME: &'static str = "FailingFullLoadPlugin";

    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FullLoadPlugin for FailingFullLoadPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, _task: FullLoadTask, _notifier: CompletionNotifier) -> SiphonResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        Err(siphon_error!(self.kind, "Injected full load failure"))
    }
}

/// Full load that panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingFullLoadPlugin;

impl PanickingFullLoadPlugin {
    pub const NAME: &'static str = "PanickingFullLoadPlugin";
}

#[async_trait]
impl FullLoadPlugin for PanickingFullLoadPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, _task: FullLoadTask, _notifier: CompletionNotifier) -> SiphonResult<()> {
        panic!("injected full load panic");
    }
}

/// Change capture that never returns and ignores shutdown requests, so it can only be
/// stopped by aborting its task.
#[derive(Debug, Clone, Default)]
pub struct StuckCdcPlugin {
    started: Arc<Notify>,
}

impl StuckCdcPlugin {
    pub const NAME: &'static str = "StuckCdcPlugin";

    pub fn new() -> Self {
        Self::default()
    }

    /// Notified once the plugin started executing.
    pub fn started(&self) -> Arc<Notify> {
        self.started.clone()
    }
}

#[async_trait]
impl CdcPlugin for StuckCdcPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, _task: CdcTask, _shutdown_rx: ShutdownRx) -> SiphonResult<()> {
        self.started.notify_one();
        future::pending::<()>().await;

        Ok(())
    }
}
