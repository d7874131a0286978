//! Error types shared by every part of the replication engine.
//!
//! [`SiphonError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error and the call site it was created at. Failures of
//! several workers are aggregated into a single value so the caller sees all of them.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type SiphonResult<T> = Result<T, SiphonError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the engine.
#[derive(Debug, Clone)]
pub struct SiphonError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Errors of several workers that failed during the same run.
    Many {
        errors: Vec<SiphonError>,
        location: &'static Location<'static>,
    },
}

/// Classification of failures, used to decide whether a run is retried.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    SourceConnectionFailed,
    AuthenticationError,
    EncryptionError,

    // Query & Execution Errors
    SourceQueryFailed,
    SourceOperationCanceled,
    SourceSchemaError,
    SourceDatabaseShutdown,
    SourceDatabaseInRecovery,
    SourceConfigurationLimitExceeded,

    // Replication Errors
    ReplicationSlotNotFound,
    ReplicationSlotNotCreated,

    // Data Errors
    ConversionError,
    InvalidData,
    DeserializationError,

    // Configuration Errors
    ConfigError,
    ValidationError,

    // IO Errors
    IoError,

    // Worker Errors
    InvalidState,
    FullLoadWorkerPanic,
    CdcWorkerPanic,

    Unknown,
}

impl SiphonError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { .. } => "Multiple errors occurred",
        }
    }

    /// Returns the detail of this error, or the first detail found among aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the aggregated errors, or `None` for a single error.
    pub fn errors(&self) -> Option<&[SiphonError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Attaches an originating error. Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SiphonError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn wrap<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        SiphonError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for SiphonError {
    fn eq(&self, other: &SiphonError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for SiphonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace:", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, header: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {header}")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for SiphonError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for SiphonError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SiphonError {
        SiphonError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for SiphonError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SiphonError {
        SiphonError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl<E> From<Vec<E>> for SiphonError
where
    E: Into<SiphonError>,
{
    /// Aggregates errors. A single error is returned unchanged.
    #[track_caller]
    fn from(errors: Vec<E>) -> SiphonError {
        let location = Location::caller();
        let mut errors: Vec<SiphonError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        SiphonError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for SiphonError {
    #[track_caller]
    fn from(err: std::io::Error) -> SiphonError {
        SiphonError::wrap(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for SiphonError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SiphonError {
        match err.classify() {
            serde_json::error::Category::Io => {
                SiphonError::wrap(ErrorKind::IoError, "JSON I/O operation failed", err)
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => SiphonError::wrap(
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
                err,
            ),
        }
    }
}

impl From<std::str::Utf8Error> for SiphonError {
    #[track_caller]
    fn from(err: std::str::Utf8Error) -> SiphonError {
        SiphonError::wrap(ErrorKind::ConversionError, "UTF-8 conversion failed", err)
    }
}

impl From<tokio_postgres::Error> for SiphonError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> SiphonError {
        use tokio_postgres::error::SqlState;

        let (kind, description) = match err.code() {
            Some(sqlstate) => match *sqlstate {
                SqlState::CONNECTION_EXCEPTION
                | SqlState::CONNECTION_DOES_NOT_EXIST
                | SqlState::CONNECTION_FAILURE
                | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
                | SqlState::TOO_MANY_CONNECTIONS
                | SqlState::IDLE_SESSION_TIMEOUT => (
                    ErrorKind::SourceConnectionFailed,
                    "PostgreSQL connection failed",
                ),

                SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                    ErrorKind::AuthenticationError,
                    "PostgreSQL authentication failed",
                ),

                SqlState::UNDEFINED_TABLE
                | SqlState::UNDEFINED_COLUMN
                | SqlState::UNDEFINED_FUNCTION
                | SqlState::UNDEFINED_SCHEMA => (
                    ErrorKind::SourceSchemaError,
                    "PostgreSQL schema object not found",
                ),

                // Raised by the slot functions for a missing slot.
                SqlState::UNDEFINED_OBJECT => (
                    ErrorKind::ReplicationSlotNotFound,
                    "PostgreSQL object not found",
                ),

                SqlState::DUPLICATE_OBJECT => (
                    ErrorKind::ReplicationSlotNotCreated,
                    "PostgreSQL object already exists",
                ),

                SqlState::DATA_EXCEPTION
                | SqlState::INVALID_TEXT_REPRESENTATION
                | SqlState::NUMERIC_VALUE_OUT_OF_RANGE => (
                    ErrorKind::ConversionError,
                    "PostgreSQL data conversion failed",
                ),

                SqlState::QUERY_CANCELED | SqlState::OPERATOR_INTERVENTION => (
                    ErrorKind::SourceOperationCanceled,
                    "PostgreSQL query canceled",
                ),
                SqlState::ADMIN_SHUTDOWN | SqlState::CRASH_SHUTDOWN => (
                    ErrorKind::SourceDatabaseShutdown,
                    "PostgreSQL shutdown",
                ),
                SqlState::CANNOT_CONNECT_NOW => (
                    ErrorKind::SourceDatabaseInRecovery,
                    "PostgreSQL database in recovery",
                ),

                SqlState::OBJECT_IN_USE | SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE => {
                    (ErrorKind::InvalidState, "PostgreSQL object in use")
                }

                SqlState::CONFIGURATION_LIMIT_EXCEEDED => (
                    ErrorKind::SourceConfigurationLimitExceeded,
                    "PostgreSQL configuration limit exceeded",
                ),

                _ => (ErrorKind::SourceQueryFailed, "PostgreSQL query failed"),
            },
            // No SQLSTATE means the failure happened below the protocol level.
            None => (
                ErrorKind::SourceConnectionFailed,
                "PostgreSQL connection failed",
            ),
        };

        SiphonError::wrap(kind, description, err)
    }
}

impl From<rustls::Error> for SiphonError {
    #[track_caller]
    fn from(err: rustls::Error) -> SiphonError {
        SiphonError::wrap(ErrorKind::EncryptionError, "TLS configuration failed", err)
    }
}

impl From<siphon_config::shared::ValidationError> for SiphonError {
    #[track_caller]
    fn from(err: siphon_config::shared::ValidationError) -> SiphonError {
        SiphonError::wrap(ErrorKind::ConfigError, "Invalid job configuration", err)
    }
}

impl From<siphon_postgres::types::TableNameError> for SiphonError {
    #[track_caller]
    fn from(err: siphon_postgres::types::TableNameError) -> SiphonError {
        SiphonError::wrap(ErrorKind::ConfigError, "Invalid table name", err)
    }
}

impl From<siphon_postgres::types::ParseLsnError> for SiphonError {
    #[track_caller]
    fn from(err: siphon_postgres::types::ParseLsnError) -> SiphonError {
        SiphonError::wrap(ErrorKind::InvalidData, "Invalid log sequence number", err)
    }
}

impl From<siphon_postgres::slots::SlotNameError> for SiphonError {
    #[track_caller]
    fn from(err: siphon_postgres::slots::SlotNameError) -> SiphonError {
        SiphonError::wrap(ErrorKind::ConfigError, "Invalid replication slot name", err)
    }
}
