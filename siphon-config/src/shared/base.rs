use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The source connection string is empty.
    #[error("`source.connection_string` cannot be empty")]
    EmptyConnectionString,
    /// The output location is empty.
    #[error("`output_location` cannot be empty")]
    EmptyOutputLocation,
    /// A full load was requested without any table to load.
    #[error("`table_names` cannot be empty for load type `{0}`")]
    EmptyTableNames(String),
    /// The same table was listed more than once.
    #[error("table `{0}` is listed more than once in `table_names`")]
    DuplicateTableName(String),
    /// A plugin name is required for the configured load type but missing.
    #[error("`{field}` must be set for load type `{load_type}`")]
    MissingPluginName {
        field: &'static str,
        load_type: String,
    },
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A field holds a value outside of its accepted range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
