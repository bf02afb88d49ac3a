//! Runtime error types

use std::fmt;
use std::path::PathBuf;

/// Result type for runtime operations
pub type EngineResult<T> = Result<T, Exception>;

/// Class of a thrown exception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Generic `Error`
    Error,
    /// `TypeError`
    TypeError,
    /// `RangeError`
    RangeError,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionKind::Error => write!(f, "Error"),
            ExceptionKind::TypeError => write!(f, "TypeError"),
            ExceptionKind::RangeError => write!(f, "RangeError"),
        }
    }
}

/// A thrown runtime exception.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Exception {
    /// Exception class
    pub kind: ExceptionKind,
    /// Message as seen by script code
    pub message: String,
}

impl Exception {
    /// Create an exception of the given kind
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Generic `Error`
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Error, message)
    }

    /// `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    /// `RangeError`
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::RangeError, message)
    }
}

/// Errors loading runtime configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for the options type
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
