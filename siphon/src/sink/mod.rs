//! Files written by the workers.
//!
//! A full load writes one bulk file per table and splits it into numbered shards. The CDC worker
//! writes one numbered file per table and poll cycle. A `_success` marker in a table directory
//! records that its full load completed.

use std::path::Path;

use crate::error::SiphonResult;

pub mod cdc;
pub mod full_load;

/// Name of the marker file written once a table directory holds a complete full load.
pub const SUCCESS_MARKER: &str = "_success";

pub async fn is_marked_complete(directory: &Path) -> SiphonResult<bool> {
    let exists = tokio::fs::try_exists(directory.join(SUCCESS_MARKER)).await?;

    Ok(exists)
}

pub async fn mark_complete(directory: &Path) -> SiphonResult<()> {
    tokio::fs::write(directory.join(SUCCESS_MARKER), b"").await?;

    Ok(())
}

/// Removes `directory` with its content, if present, and creates it empty.
pub async fn reset_directory(directory: &Path) -> SiphonResult<()> {
    if tokio::fs::try_exists(directory).await? {
        tokio::fs::remove_dir_all(directory).await?;
    }
    tokio::fs::create_dir_all(directory).await?;

    Ok(())
}
