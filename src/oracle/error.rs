/// Failure taxonomy for the Oracle adapter

use std::error::Error as StdError;
use std::fmt;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error raised by the native driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Reported by the database or the client library (ORA-/DPI- codes)
    #[error("{0}")]
    Database(String),

    /// Any other driver failure: conversions, unsupported settings, misuse
    #[error("{0}")]
    Interface(String),
}

impl DriverError {
    /// Classifies a raw driver message by its Oracle error code
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("ORA-") || message.contains("DPI-") {
            DriverError::Database(message)
        } else {
            DriverError::Interface(message)
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DriverError::Database(m) | DriverError::Interface(m) => m,
        }
    }

    pub fn is_database(&self) -> bool {
        matches!(self, DriverError::Database(_))
    }
}

impl From<oracle::Error> for DriverError {
    fn from(e: oracle::Error) -> Self {
        DriverError::classify(e.to_string())
    }
}

/// Host runtime failure
///
/// Raised for anything that is not a database error. A failure that is
/// already a `RuntimeFailure` travels through the adapter untouched.
#[derive(Debug)]
pub struct RuntimeFailure {
    message: String,
    source: Option<BoxError>,
}

impl RuntimeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary error, keeping it as the source
    pub fn caused_by(cause: BoxError) -> Self {
        Self {
            message: cause.to_string(),
            source: Some(cause),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for RuntimeFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Errors surfaced to the host
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Opening the native handle failed
    #[error("Failed to connect: {0}")]
    ConnectionFailure(String),

    /// A statement failed in the database; the message is the SQL followed by the driver text
    #[error("{sql}{message}")]
    QueryFailure { sql: String, message: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeFailure),
}

impl AdapterError {
    pub(crate) fn query_failure(sql: &str, error: &DriverError) -> Self {
        AdapterError::QueryFailure {
            sql: sql.to_string(),
            message: error.message().trim().to_string(),
        }
    }
}

/// Raised when a statement is issued on a connection without a handle
#[derive(Debug, thiserror::Error)]
#[error("Connection \"{0}\" is not open")]
pub struct NotOpen(pub String);

/// Failure inside the error-translation boundary, before it is translated
///
/// The variant decides the treatment: database errors are rewritten with
/// the statement text, runtime failures pass through, the rest is wrapped.
#[derive(Debug)]
pub enum ExecutionError {
    Driver(DriverError),
    Runtime(RuntimeFailure),
    Other(BoxError),
}

impl ExecutionError {
    pub fn other<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ExecutionError::Other(Box::new(error))
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Driver(e) => write!(f, "{}", e),
            ExecutionError::Runtime(e) => write!(f, "{}", e),
            ExecutionError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl From<DriverError> for ExecutionError {
    fn from(e: DriverError) -> Self {
        if e.is_database() {
            ExecutionError::Driver(e)
        } else {
            ExecutionError::Other(Box::new(e))
        }
    }
}

impl From<RuntimeFailure> for ExecutionError {
    fn from(e: RuntimeFailure) -> Self {
        ExecutionError::Runtime(e)
    }
}

impl From<NotOpen> for ExecutionError {
    fn from(e: NotOpen) -> Self {
        ExecutionError::other(e)
    }
}
