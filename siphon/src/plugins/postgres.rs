use async_trait::async_trait;

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::SiphonResult;
use crate::plugins::base::{CdcPlugin, CdcTask, CompletionNotifier, FullLoadPlugin, FullLoadTask};
use crate::replication::client::PgSourceClient;
use crate::workers::cdc::CdcJob;
use crate::workers::full_load::FullLoadJob;

/// Full load through `COPY ... TO STDOUT` on a dedicated connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgDefaultFullLoadPlugin;

impl PgDefaultFullLoadPlugin {
    pub const NAME: &'static str = "PgDefaultFullLoadPlugin";
}

#[async_trait]
impl FullLoadPlugin for PgDefaultFullLoadPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, task: FullLoadTask, notifier: CompletionNotifier) -> SiphonResult<()> {
        let client = PgSourceClient::connect(&task.source).await?;

        FullLoadJob::new(task).execute(&client, &notifier).await
    }
}

/// Change capture from a wal2json logical replication slot on a dedicated connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgDefaultCDCPlugin;

impl PgDefaultCDCPlugin {
    pub const NAME: &'static str = "PgDefaultCDCPlugin";
}

#[async_trait]
impl CdcPlugin for PgDefaultCDCPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&self, task: CdcTask, shutdown_rx: ShutdownRx) -> SiphonResult<()> {
        let client = PgSourceClient::connect(&task.source).await?;

        CdcJob::new(task).run(&client, shutdown_rx).await
    }
}
