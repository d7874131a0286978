//! Decoding of wal2json (format version 1) documents into per-table change records.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use siphon_postgres::types::parse_lsn;
use tracing::warn;

use crate::error::SiphonResult;
use crate::replication::source::RawChange;
use crate::types::{PgLsn, TableName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => f.write_str("insert"),
            ChangeKind::Update => f.write_str("update"),
            ChangeKind::Delete => f.write_str("delete"),
        }
    }
}

/// Key columns identifying the previous version of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OldKeys {
    pub keynames: Vec<String>,
    pub keytypes: Vec<String>,
    pub keyvalues: Vec<Value>,
}

/// A single row change as emitted by wal2json.
///
/// Field order matters: it is the key order of a record built with [`ChangeEvent::encode`].
/// Deletes carry no column values, only [`OldKeys`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columnnames: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columntypes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columnvalues: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldkeys: Option<OldKeys>,
}

impl ChangeEvent {
    pub fn table_name(&self) -> TableName {
        TableName::new(self.schema.clone(), self.table.clone())
    }

    /// Renders the event as one record line.
    pub fn encode(&self) -> SiphonResult<String> {
        encode_record(self)
    }
}

/// Writes `value` as one record line through [`RecordFormatter`].
///
/// Numbers are written with the digits they were parsed from, so `numeric` values wider than
/// 64 bits are kept exact.
pub fn encode_record<T>(value: &T) -> SiphonResult<String>
where
    T: Serialize + ?Sized,
{
    let mut buffer = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, RecordFormatter);
    value.serialize(&mut serializer)?;

    Ok(String::from_utf8(buffer).map_err(|err| err.utf8_error())?)
}

/// One transaction document. Only the changes are of interest.
#[derive(Debug, Deserialize)]
struct ChangeSet {
    #[serde(default)]
    change: Vec<Value>,
}

/// JSON formatter writing `", "` between items and `": "` after keys, with every non ASCII
/// character escaped as `\uXXXX`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFormatter;

impl serde_json::ser::Formatter for RecordFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }

        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }

        Ok(())
    }
}

/// Changes of one peek, grouped by table in emission order.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub groups: BTreeMap<TableName, Vec<String>>,
    /// Highest position seen, including transactions without any relevant change.
    pub max_lsn: Option<PgLsn>,
    /// Number of rows or change entries that could not be decoded and were skipped.
    pub malformed: usize,
}

impl DecodedBatch {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of records per table, for logging.
    pub fn record_counts(&self) -> BTreeMap<String, usize> {
        self.groups
            .iter()
            .map(|(table_name, records)| (table_name.to_string(), records.len()))
            .collect()
    }
}

/// Decodes peeked `rows`, keeping only the changes of `table_names`.
///
/// Malformed rows and entries are logged and skipped. The position of a malformed row still
/// counts towards [`DecodedBatch::max_lsn`] so that it is consumed with the rest of the batch.
pub fn decode_changes(rows: &[RawChange], table_names: &HashSet<TableName>) -> DecodedBatch {
    let mut batch = DecodedBatch::default();

    for row in rows {
        match parse_lsn(&row.lsn) {
            Ok(lsn) => batch.max_lsn = Some(batch.max_lsn.map_or(lsn, |max| max.max(lsn))),
            Err(err) => {
                warn!(error = %err, "skipping change with invalid lsn");
                batch.malformed += 1;
                continue;
            }
        }

        let change_set: ChangeSet = match serde_json::from_str(&row.data) {
            Ok(change_set) => change_set,
            Err(err) => {
                warn!(lsn = %row.lsn, error = %err, "skipping undecodable change set");
                batch.malformed += 1;
                continue;
            }
        };

        for entry in change_set.change {
            // Entries without a table, such as logical messages, are not row changes.
            if entry.get("table").is_none() {
                continue;
            }

            match encode_entry(&entry) {
                Ok((table_name, record)) => {
                    if table_names.contains(&table_name) {
                        batch.groups.entry(table_name).or_default().push(record);
                    }
                }
                Err(err) => {
                    warn!(lsn = %row.lsn, error = %err, "skipping malformed change");
                    batch.malformed += 1;
                }
            }
        }
    }

    batch
}

/// Checks that `entry` is a row change and writes it with its keys in the received order.
fn encode_entry(entry: &Value) -> SiphonResult<(TableName, String)> {
    let event = ChangeEvent::deserialize(entry)?;
    let record = encode_record(entry)?;

    Ok((event.table_name(), record))
}
