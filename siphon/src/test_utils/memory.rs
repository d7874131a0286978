use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::bail;
use crate::error::{ErrorKind, SiphonResult};
use crate::replication::source::{RawChange, SlotSource, SnapshotSource};
use crate::siphon_error;
use crate::types::{PgLsn, TableName};

/// Snapshot source serving table contents from memory, in `COPY` text format.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotSource {
    tables: Arc<Mutex<HashMap<TableName, Vec<Bytes>>>>,
}

impl MemorySnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table whose rows are given as lists of text columns.
    pub fn add_table(&self, table_name: TableName, rows: &[&[&str]]) {
        let chunks = rows
            .iter()
            .map(|columns| Bytes::from(format!("{}\n", columns.join("\t"))))
            .collect();

        self.add_table_chunks(table_name, chunks);
    }

    /// Adds a table streamed as the given raw chunks, which need not align with rows.
    pub fn add_table_chunks(&self, table_name: TableName, chunks: Vec<Bytes>) {
        self.tables.lock().unwrap().insert(table_name, chunks);
    }
}

#[async_trait]
impl SnapshotSource for MemorySnapshotSource {
    async fn copy_table(
        &self,
        table_name: &TableName,
    ) -> SiphonResult<BoxStream<'static, SiphonResult<Bytes>>> {
        let Some(chunks) = self.tables.lock().unwrap().get(table_name).cloned() else {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Table does not exist",
                format!("relation \"{table_name}\" does not exist")
            );
        };

        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }
}

#[derive(Debug, Default)]
struct SlotState {
    slots: HashSet<String>,
    backlog: VecDeque<(PgLsn, String)>,
    tables: Vec<TableName>,
    next_lsn: u64,
    peek_failures: u32,
    confirm_failures: u32,
    peeks: u64,
    confirmed: Vec<PgLsn>,
}

/// Replication slot kept in memory.
///
/// Transactions are appended as wal2json documents. Peeking returns every pending
/// transaction and confirming removes the ones up to the given position, like the SQL slot
/// functions do.
#[derive(Debug, Clone, Default)]
pub struct MemorySlotSource {
    state: Arc<Mutex<SlotState>>,
    peeked: Arc<Notify>,
}

impl MemorySlotSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tables returned by table discovery.
    pub fn with_tables(self, tables: Vec<TableName>) -> Self {
        self.state.lock().unwrap().tables = tables;
        self
    }

    /// Creates `slot_name` as if it existed before.
    pub fn with_slot(self, slot_name: &str) -> Self {
        self.state.lock().unwrap().slots.insert(slot_name.to_string());
        self
    }

    pub fn has_slot(&self, slot_name: &str) -> bool {
        self.state.lock().unwrap().slots.contains(slot_name)
    }

    /// Appends a transaction document and returns its position.
    pub fn push_transaction(&self, document: Value) -> PgLsn {
        let mut state = self.state.lock().unwrap();
        state.next_lsn += 0x100;
        let lsn = PgLsn::from(state.next_lsn);
        state.backlog.push_back((lsn, document.to_string()));

        lsn
    }

    /// Appends a raw, possibly malformed, payload.
    pub fn push_raw(&self, data: &str) -> PgLsn {
        let mut state = self.state.lock().unwrap();
        state.next_lsn += 0x100;
        let lsn = PgLsn::from(state.next_lsn);
        state.backlog.push_back((lsn, data.to_string()));

        lsn
    }

    /// Appends a single insert transaction.
    pub fn push_insert(
        &self,
        table_name: &TableName,
        columns: &[(&str, &str)],
        values: Vec<Value>,
    ) -> PgLsn {
        self.push_transaction(json!({
            "xid": 1,
            "change": [insert_change(table_name, columns, values)]
        }))
    }

    pub fn backlog_len(&self) -> usize {
        self.state.lock().unwrap().backlog.len()
    }

    pub fn peek_count(&self) -> u64 {
        self.state.lock().unwrap().peeks
    }

    /// Positions passed to every successful confirm, in order.
    pub fn confirmed(&self) -> Vec<PgLsn> {
        self.state.lock().unwrap().confirmed.clone()
    }

    /// Makes the next `count` peeks fail.
    pub fn fail_next_peeks(&self, count: u32) {
        self.state.lock().unwrap().peek_failures = count;
    }

    /// Makes the next `count` confirms fail.
    pub fn fail_next_confirms(&self, count: u32) {
        self.state.lock().unwrap().confirm_failures = count;
    }

    /// Notified after every peek, failed or not.
    pub fn peeked(&self) -> Arc<Notify> {
        self.peeked.clone()
    }
}

/// Builds the wal2json entry of an insert.
pub fn insert_change(table_name: &TableName, columns: &[(&str, &str)], values: Vec<Value>) -> Value {
    json!({
        "kind": "insert",
        "schema": table_name.schema,
        "table": table_name.name,
        "columnnames": columns.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
        "columntypes": columns.iter().map(|(_, type_name)| *type_name).collect::<Vec<_>>(),
        "columnvalues": values,
    })
}

#[async_trait]
impl SlotSource for MemorySlotSource {
    async fn slot_exists(&self, slot_name: &str) -> SiphonResult<bool> {
        Ok(self.has_slot(slot_name))
    }

    async fn create_slot(&self, slot_name: &str) -> SiphonResult<()> {
        if !self.state.lock().unwrap().slots.insert(slot_name.to_string()) {
            bail!(
                ErrorKind::ReplicationSlotNotCreated,
                "Replication slot already exists",
                format!("replication slot \"{slot_name}\" already exists")
            );
        }

        Ok(())
    }

    async fn drop_slot(&self, slot_name: &str) -> SiphonResult<()> {
        if !self.state.lock().unwrap().slots.remove(slot_name) {
            bail!(
                ErrorKind::ReplicationSlotNotFound,
                "Replication slot not found",
                format!("replication slot \"{slot_name}\" does not exist")
            );
        }

        Ok(())
    }

    async fn peek_changes(
        &self,
        slot_name: &str,
        _table_names: &[TableName],
    ) -> SiphonResult<Vec<RawChange>> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.peeks += 1;

            if !state.slots.contains(slot_name) {
                Err(siphon_error!(
                    ErrorKind::ReplicationSlotNotFound,
                    "Replication slot not found",
                    format!("replication slot \"{slot_name}\" does not exist")
                ))
            } else if state.peek_failures > 0 {
                state.peek_failures -= 1;
                Err(siphon_error!(
                    ErrorKind::SourceConnectionFailed,
                    "Connection to the source lost"
                ))
            } else {
                Ok(state
                    .backlog
                    .iter()
                    .map(|(lsn, data)| RawChange {
                        lsn: lsn.to_string(),
                        data: data.clone(),
                    })
                    .collect())
            }
        };
        self.peeked.notify_waiters();

        result
    }

    async fn confirm_changes(
        &self,
        slot_name: &str,
        upto: PgLsn,
        _table_names: &[TableName],
    ) -> SiphonResult<()> {
        let mut state = self.state.lock().unwrap();

        if !state.slots.contains(slot_name) {
            bail!(
                ErrorKind::ReplicationSlotNotFound,
                "Replication slot not found",
                format!("replication slot \"{slot_name}\" does not exist")
            );
        }
        if state.confirm_failures > 0 {
            state.confirm_failures -= 1;
            bail!(ErrorKind::SourceQueryFailed, "Confirming changes failed");
        }

        while state
            .backlog
            .front()
            .is_some_and(|(lsn, _)| *lsn <= upto)
        {
            state.backlog.pop_front();
        }
        state.confirmed.push(upto);

        Ok(())
    }

    async fn list_tables(&self) -> SiphonResult<Vec<TableName>> {
        Ok(self.state.lock().unwrap().tables.clone())
    }
}
