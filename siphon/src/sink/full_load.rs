use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use crate::error::SiphonResult;
use crate::types::TableName;

pub fn bulk_file_name(table_name: &TableName) -> String {
    format!("{table_name}_full.csv")
}

/// Name of the shard at `index`: `x00_<table>.csv`, `x01_<table>.csv`, ...
pub fn shard_file_name(table_name: &TableName, index: usize) -> String {
    format!("x{index:02}_{table_name}.csv")
}

/// Bulk file receiving the raw `COPY` output of a table.
#[derive(Debug)]
pub struct BulkFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: u64,
}

impl BulkFileWriter {
    pub async fn create(directory: &Path, table_name: &TableName) -> SiphonResult<Self> {
        let path = directory.join(bulk_file_name(table_name));
        let file = File::create(&path).await?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            rows: 0,
        })
    }

    /// Appends a chunk of `COPY` text output. Rows are counted by their line terminator.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> SiphonResult<()> {
        self.rows += chunk.iter().filter(|byte| **byte == b'\n').count() as u64;
        self.writer.write_all(chunk).await?;

        Ok(())
    }

    pub async fn finish(mut self) -> SiphonResult<BulkFile> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;

        Ok(BulkFile {
            path: self.path,
            rows: self.rows,
        })
    }
}

/// Bulk file once fully written.
#[derive(Debug, Clone)]
pub struct BulkFile {
    pub path: PathBuf,
    pub rows: u64,
}

/// Splits `bulk` into shards of at most `split_threshold` lines written next to it.
///
/// An empty bulk file produces no shard.
pub async fn split_into_shards(
    bulk: &BulkFile,
    directory: &Path,
    table_name: &TableName,
    split_threshold: u64,
) -> SiphonResult<Vec<PathBuf>> {
    let mut reader = BufReader::new(File::open(&bulk.path).await?);
    let mut shards = Vec::new();
    let mut current: Option<BufWriter<File>> = None;
    let mut lines_in_shard = 0u64;
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        if current.is_none() {
            let path = directory.join(shard_file_name(table_name, shards.len()));
            current = Some(BufWriter::new(File::create(&path).await?));
            shards.push(path);
        }
        if let Some(writer) = current.as_mut() {
            writer.write_all(&line).await?;
        }
        lines_in_shard += 1;

        if lines_in_shard == split_threshold {
            if let Some(mut writer) = current.take() {
                writer.flush().await?;
            }
            lines_in_shard = 0;
        }
    }

    if let Some(mut writer) = current.take() {
        writer.flush().await?;
    }

    debug!(table = %table_name, shards = shards.len(), "bulk file split");

    Ok(shards)
}

/// Leaves exactly the shards behind: without any shard the bulk file itself becomes the first
/// shard, otherwise it is removed. Returns the final shard list.
pub async fn finalize_single_file(
    bulk: BulkFile,
    directory: &Path,
    table_name: &TableName,
    shards: Vec<PathBuf>,
) -> SiphonResult<Vec<PathBuf>> {
    if shards.is_empty() {
        let first_shard = directory.join(shard_file_name(table_name, 0));
        tokio::fs::rename(&bulk.path, &first_shard).await?;

        return Ok(vec![first_shard]);
    }

    tokio::fs::remove_file(&bulk.path).await?;

    Ok(shards)
}
