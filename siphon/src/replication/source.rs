use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use siphon_config::shared::SlotCreation;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, SiphonResult};
use crate::types::{PgLsn, TableName};

/// One row returned by peeking a wal2json slot: the position of the transaction and its JSON
/// document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub lsn: String,
    pub data: String,
}

/// Source of table snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Streams the `COPY ... TO STDOUT` text output of `table_name`: tab separated columns, one
    /// newline terminated line per row.
    async fn copy_table(
        &self,
        table_name: &TableName,
    ) -> SiphonResult<BoxStream<'static, SiphonResult<Bytes>>>;
}

/// Narrow interface over a logical replication slot decoded with wal2json.
#[async_trait]
pub trait SlotSource: Send + Sync {
    async fn slot_exists(&self, slot_name: &str) -> SiphonResult<bool>;

    async fn create_slot(&self, slot_name: &str) -> SiphonResult<()>;

    async fn drop_slot(&self, slot_name: &str) -> SiphonResult<()>;

    /// Returns the pending changes of `table_names` without consuming them.
    async fn peek_changes(
        &self,
        slot_name: &str,
        table_names: &[TableName],
    ) -> SiphonResult<Vec<RawChange>>;

    /// Consumes every pending change up to and including `upto`.
    async fn confirm_changes(
        &self,
        slot_name: &str,
        upto: PgLsn,
        table_names: &[TableName],
    ) -> SiphonResult<()>;

    /// Lists the user tables of the database.
    async fn list_tables(&self) -> SiphonResult<Vec<TableName>>;
}

/// Makes sure `slot_name` exists, creating it when allowed by `creation`.
///
/// Returns `true` when the slot was created by this call.
pub async fn ensure_slot<S>(source: &S, slot_name: &str, creation: SlotCreation) -> SiphonResult<bool>
where
    S: SlotSource + ?Sized,
{
    if source.slot_exists(slot_name).await? {
        info!(slot = slot_name, "using existing replication slot");
        return Ok(false);
    }

    match creation {
        SlotCreation::CreateIfMissing => {
            info!(slot = slot_name, "creating replication slot");
            source.create_slot(slot_name).await?;

            Ok(true)
        }
        SlotCreation::RequireExisting => {
            bail!(
                ErrorKind::ConfigError,
                "Replication slot does not exist",
                format!("Replication slot '{slot_name}' is required to exist but was not found")
            );
        }
    }
}
