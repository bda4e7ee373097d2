//! Error types for the locality engine and the table pipeline.
//!
//! Soft conditions (skipped rows, unmatched joins, a missing dimension file)
//! are *not* errors: they are counted in the reports returned by the
//! operations that detect them. Everything here aborts the operation that
//! raised it.
//!
//! ```
//! use light_etl::error::EtlError;
//! use light_etl::locality::KeySpace;
//!
//! let err = EtlError::KeyWidthExceeded { space: KeySpace::City, width: 4, next: 10_000 };
//! assert!(err.to_string().contains("10000"));
//! ```

use crate::locality::KeySpace;
use std::fmt;

/// Main error type for light-etl operations.
#[derive(Debug)]
pub enum EtlError {
    /// I/O errors (dimension file, input/output tables)
    Io(std::io::Error),

    /// Table processing errors (Polars, parsing, etc.)
    DataProcessing(String),

    /// Configuration errors
    Config(String),

    /// A table lacks a column an operation needs
    MissingColumn { table: String, column: String },

    /// The surrogate key space is exhausted for the configured width
    KeyWidthExceeded {
        space: KeySpace,
        width: usize,
        next: u64,
    },

    /// The persisted dimension exists but violates its own invariants
    CorruptDimension(String),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::MissingColumn { table, column } => {
                write!(f, "Table '{table}' has no column '{column}'")
            }
            Self::KeyWidthExceeded { space, width, next } => write!(
                f,
                "{space} key space exhausted: {next} does not fit in {width} digits"
            ),
            Self::CorruptDimension(msg) => write!(f, "Corrupt locality dimension: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EtlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<polars::error::PolarsError> for EtlError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

/// Result type alias for light-etl operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EtlError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: EtlError = e.into();
            EtlError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: EtlError = e.into();
            EtlError::Other(format!("{}: {}", f(), err))
        })
    }
}
