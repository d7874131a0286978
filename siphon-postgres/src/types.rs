use std::fmt;
use std::str::FromStr;

use pg_escape::quote_identifier;
use thiserror::Error;
use tokio_postgres::types::PgLsn;

/// Schema assumed for table names given without one.
pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableNameError {
    #[error("table name cannot be empty")]
    Empty,

    #[error("invalid table name `{0}`, expected `table` or `schema.table`")]
    Malformed(String),
}

/// A schema qualified table name.
///
/// The [`fmt::Display`] form `schema.table` is what changes are grouped by and what output
/// file names are built from.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns `schema.table` with both parts quoted as Postgres identifiers.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }

    /// Returns a token usable as a single path component: dots become underscores.
    pub fn as_path_token(&self) -> String {
        self.to_string().replace('.', "_")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for TableName {
    type Err = TableNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TableNameError::Empty);
        }

        match s.split_once('.') {
            None => Ok(TableName::new(DEFAULT_SCHEMA, s)),
            Some((schema, name))
                if !schema.is_empty() && !name.is_empty() && !name.contains('.') =>
            {
                Ok(TableName::new(schema, name))
            }
            Some(_) => Err(TableNameError::Malformed(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid postgres lsn `{0}`")]
pub struct ParseLsnError(pub String);

/// Parses the textual `X/Y` form of a log sequence number.
pub fn parse_lsn(value: &str) -> Result<PgLsn, ParseLsnError> {
    PgLsn::from_str(value.trim()).map_err(|_| ParseLsnError(value.to_string()))
}
