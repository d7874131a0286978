use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SiphonResult;
use crate::types::TableName;

/// Index of the first change file of a table.
const FIRST_INDEX: u64 = 1;

/// Numbered change files of one table: `<base>/<table token>/<table>_cdc_<n>.csv`.
///
/// The next index is derived from the files already on disk, so a restarted worker continues
/// the numbering instead of overwriting earlier files.
#[derive(Debug)]
pub struct CdcFileSink {
    table_name: TableName,
    directory: PathBuf,
    next_index: u64,
}

impl CdcFileSink {
    pub async fn open_for_table(table_name: &TableName, base_dir: &Path) -> SiphonResult<Self> {
        let directory = base_dir.join(table_name.as_path_token());
        tokio::fs::create_dir_all(&directory).await?;

        let next_index = scan_next_index(&directory, table_name).await?;
        debug!(table = %table_name, next_index, "cdc sink opened");

        Ok(Self {
            table_name: table_name.clone(),
            directory,
            next_index,
        })
    }

    pub fn table_name(&self) -> &TableName {
        &self.table_name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Writes `records` as the next numbered file, one record per line without a trailing line
    /// terminator, and advances the index. Nothing is written for an empty batch.
    pub async fn write_batch(&mut self, records: &[String]) -> SiphonResult<Option<PathBuf>> {
        if records.is_empty() {
            return Ok(None);
        }

        let file_name = file_name(&self.table_name, self.next_index);
        let path = self.directory.join(&file_name);
        let staging = self.directory.join(format!(".{file_name}.tmp"));

        tokio::fs::write(&staging, records.join("\n")).await?;
        tokio::fs::rename(&staging, &path).await?;

        self.next_index += 1;

        Ok(Some(path))
    }
}

fn file_name(table_name: &TableName, index: u64) -> String {
    format!("{table_name}_cdc_{index}.csv")
}

/// Returns the highest index found in `directory` plus one, or the first index.
async fn scan_next_index(directory: &Path, table_name: &TableName) -> SiphonResult<u64> {
    let prefix = format!("{table_name}_cdc_");
    let mut max_index: Option<u64> = None;

    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(index) = file_name
            .to_str()
            .and_then(|name| name.strip_prefix(&prefix))
            .and_then(|rest| rest.strip_suffix(".csv"))
            .and_then(|index| index.parse::<u64>().ok())
        else {
            continue;
        };

        max_index = Some(max_index.map_or(index, |max| max.max(index)));
    }

    Ok(max_index.map_or(FIRST_INDEX, |max| max + 1))
}
