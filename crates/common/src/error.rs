//! Error types for the common crate
//!
//! This module defines the structured error type used throughout the inference
//! service. Every variant carries the single-line message that is sent back to
//! the requester; the `Display` form is the verbose detail that is logged.

use thiserror::Error;

/// Result type for inference service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reply sent when a key holds a value of a different domain type
pub const WRONGTYPE_MESSAGE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or contradictory arguments or options
    Validation,
    /// Missing key
    Resolution,
    /// Key holds a value of another type
    WrongType,
    /// Backend for the requested kind is not loaded
    BackendNotLoaded,
    /// A queue or another resource could not be provided
    Resource,
    /// Input/output count does not match the model definition
    Arity,
    /// Backend failure while executing a batch
    Execution,
    /// Op exceeded its time bound
    Timeout,
    /// Configuration problem
    Config,
    /// Internal invariant violation
    Internal,
}

/// Common error type for inference service operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resolution error
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Wrong type error
    #[error("Wrong type: key '{0}' holds a value of another type")]
    WrongType(String),

    /// Backend not loaded error
    #[error("Backend not loaded: {0}")]
    BackendNotLoaded(String),

    /// Resource error
    #[error("Resource error: {0}")]
    Resource(String),

    /// Arity error
    #[error("Arity error: {0}")]
    Arity(String),

    /// Execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Resolution(_) => ErrorKind::Resolution,
            Error::WrongType(_) => ErrorKind::WrongType,
            Error::BackendNotLoaded(_) => ErrorKind::BackendNotLoaded,
            Error::Resource(_) => ErrorKind::Resource,
            Error::Arity(_) => ErrorKind::Arity,
            Error::Execution(_) => ErrorKind::Execution,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Config(_) => ErrorKind::Config,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the message carried by the error, without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Error::Validation(msg)
            | Error::Resolution(msg)
            | Error::WrongType(msg)
            | Error::BackendNotLoaded(msg)
            | Error::Resource(msg)
            | Error::Arity(msg)
            | Error::Execution(msg)
            | Error::Timeout(msg)
            | Error::Config(msg)
            | Error::Internal(msg) => msg,
        }
    }

    /// Returns the single-line reply for this error
    pub fn oneline(&self) -> String {
        match self {
            Error::WrongType(_) => WRONGTYPE_MESSAGE.to_string(),
            other => format!("ERR {}", other.message()),
        }
    }

    /// Returns true if the error can be recovered by loading a default backend
    pub fn is_backend_not_loaded(&self) -> bool {
        matches!(self, Error::BackendNotLoaded(_))
    }

    /// Returns true if the error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
