//! Error types for the bridge

use tether_engine::{Exception, ExceptionKind};

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Broad class of a [`BridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A value did not have the shape a native signature expects
    Conversion,
    /// A class could not be instantiated
    Construction,
    /// A held value is gone, or the bridge is not set up
    Lifetime,
    /// A collection poll ran out of attempts
    PollTimeout,
    /// An exception raised by runtime or native code, passed through
    Runtime,
}

/// Bridge error types
///
/// Display strings are the messages script code sees.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// Argument at `index` did not convert
    #[error("Error processing argument at index {index}, conversion failure from {actual} to {expected}.")]
    ArgumentConversion {
        /// Zero-based argument position
        index: usize,
        /// Type name of the value received
        actual: String,
        /// Type name the signature expects
        expected: &'static str,
    },

    /// Receiver is not (or no longer) an instance of the expected class
    #[error("Error converting \"this\" to {expected}.")]
    ReceiverConversion {
        /// Class name the method belongs to
        expected: &'static str,
    },

    /// A required argument was omitted
    #[error("Insufficient number of arguments.")]
    InsufficientArguments,

    /// Standalone conversion failed
    #[error("Conversion failure from {actual} to {expected}.")]
    ValueConversion {
        /// Type name of the value received
        actual: String,
        /// Requested type name
        expected: &'static str,
    },

    /// A runtime function returned a value the caller cannot use
    #[error("Error converting return value from {actual} to {expected}.")]
    ReturnConversion {
        /// Type name of the value returned
        actual: String,
        /// Type name the caller expects
        expected: &'static str,
    },

    /// Class was registered without a constructor
    #[error("There is no constructor defined.")]
    NoConstructor,

    /// Constructor invoked as a plain function
    #[error("Constructor must be called with new.")]
    ConstructorWithoutNew,

    /// A weakly held callback was collected before it was called
    #[error("The function has been garbage collected")]
    FunctionCollected,

    /// `tether_bind::init` has not been called for this runtime
    #[error("Bridge is not initialized for this runtime")]
    NotInitialized,

    /// `gc_until` exhausted its attempts
    #[error("GC failure")]
    PollTimeout {
        /// Collection passes attempted
        attempts: usize,
    },

    /// Exception raised by runtime or native code
    #[error("{}", .0.message)]
    Thrown(Exception),
}

impl BridgeError {
    /// A generic `Error` with the given message, for native code to raise
    pub fn error(message: impl Into<String>) -> Self {
        BridgeError::Thrown(Exception::error(message))
    }

    /// A `TypeError` with the given message
    pub fn type_error(message: impl Into<String>) -> Self {
        BridgeError::Thrown(Exception::type_error(message))
    }

    /// Which class of failure this is
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::ArgumentConversion { .. }
            | BridgeError::ReceiverConversion { .. }
            | BridgeError::InsufficientArguments
            | BridgeError::ValueConversion { .. }
            | BridgeError::ReturnConversion { .. } => ErrorCategory::Conversion,
            BridgeError::NoConstructor | BridgeError::ConstructorWithoutNew => {
                ErrorCategory::Construction
            }
            BridgeError::FunctionCollected | BridgeError::NotInitialized => {
                ErrorCategory::Lifetime
            }
            BridgeError::PollTimeout { .. } => ErrorCategory::PollTimeout,
            BridgeError::Thrown(_) => ErrorCategory::Runtime,
        }
    }
}

impl From<Exception> for BridgeError {
    fn from(e: Exception) -> Self {
        BridgeError::Thrown(e)
    }
}

/// Conversion failures surface as `TypeError`, everything else as `Error`;
/// exceptions from runtime code pass through unchanged.
impl From<BridgeError> for Exception {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Thrown(exception) => exception,
            other => {
                let kind = match other.category() {
                    ErrorCategory::Conversion => ExceptionKind::TypeError,
                    _ => ExceptionKind::Error,
                };
                Exception::new(kind, other.to_string())
            }
        }
    }
}
