use thiserror::Error;

/// Replication slot used when none is configured.
pub const DEFAULT_SLOT_NAME: &str = "siphon_slot";

/// Logical decoding output plugin the change stream is decoded with.
pub const WAL2JSON: &str = "wal2json";

/// Maximum length for a Postgres replication slot name in bytes.
const MAX_SLOT_NAME_LENGTH: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotNameError {
    #[error("Invalid slot name length: {0}")]
    InvalidSlotNameLength(String),

    #[error("Invalid slot name: {0}")]
    InvalidSlotName(String),
}

/// Checks `slot_name` against the rules Postgres applies to replication slot names: lower case
/// letters, digits and underscores, at most 63 bytes.
pub fn validate_slot_name(slot_name: &str) -> Result<(), SlotNameError> {
    if slot_name.is_empty()
        || !slot_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(SlotNameError::InvalidSlotName(slot_name.to_string()));
    }

    if slot_name.len() > MAX_SLOT_NAME_LENGTH {
        return Err(SlotNameError::InvalidSlotNameLength(slot_name.to_string()));
    }

    Ok(())
}
