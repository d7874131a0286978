//! Metrics definitions for replication monitoring.

/// Label for table name in metrics.
pub const TABLE_NAME_LABEL: &str = "table_name";

// Full load metrics

/// Counter for rows copied from the source into bulk files.
pub const SIPHON_FULL_LOAD_ROWS_COPIED_TOTAL: &str = "siphon_full_load_rows_copied_total";

/// Counter for shards written by completed full loads.
pub const SIPHON_FULL_LOAD_SHARDS_WRITTEN_TOTAL: &str = "siphon_full_load_shards_written_total";

// CDC metrics

/// Counter for change records written to change files.
pub const SIPHON_CDC_RECORDS_WRITTEN_TOTAL: &str = "siphon_cdc_records_written_total";

/// Counter for poll cycles whose changes were consumed from the slot.
pub const SIPHON_CDC_CYCLES_CONFIRMED_TOTAL: &str = "siphon_cdc_cycles_confirmed_total";

/// Counter for poll cycles that failed and left their changes in the slot.
pub const SIPHON_CDC_CYCLE_FAILURES_TOTAL: &str = "siphon_cdc_cycle_failures_total";

/// Counter for peeked rows or change entries skipped because they could not be decoded.
pub const SIPHON_CDC_MALFORMED_CHANGES_TOTAL: &str = "siphon_cdc_malformed_changes_total";
