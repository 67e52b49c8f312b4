//! Error type for port sessions.
//!
//! Parameter problems are reported before the OS is touched; errors coming from
//! the OS are wrapped in the variant describing which step failed and are never
//! retried here.

use std::io;
use thiserror::Error;

/// A specialized `Result` type for port operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while using a serial port session.
#[derive(Debug, Error)]
pub enum Error {
    /// The device is missing, busy or not accessible.
    #[error("Failed to open serial port {name}: {source}")]
    OpenFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The OS refused to report the line configuration.
    #[error("Failed to query line configuration: {0}")]
    QueryFailed(#[source] io::Error),

    /// The OS refused to apply (or restore) a line configuration.
    #[error("Failed to apply line configuration: {0}")]
    ApplyFailed(#[source] io::Error),

    /// A requested value is outside of what the port supports.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The deadline of the operation elapsed.
    ///
    /// `transferred` is the number of bytes moved by this call before the
    /// deadline hit. It is always 0 for reads.
    #[error("Operation timed out after transferring {transferred} byte(s)")]
    Timeout { transferred: usize },

    /// A transport-level failure, for example a disconnected device.
    #[error("I/O failure after transferring {transferred} byte(s): {source}")]
    IoFailure {
        transferred: usize,
        #[source]
        source: io::Error,
    },

    /// The session has already been closed.
    #[error("Port is already closed")]
    AlreadyClosed,
}

impl Error {
    /// Create an InvalidParameter error from a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Create an IoFailure error.
    pub fn io(transferred: usize, source: io::Error) -> Self {
        Self::IoFailure {
            transferred,
            source,
        }
    }

    /// Number of bytes moved by the failed call before it failed.
    pub fn transferred(&self) -> usize {
        match self {
            Self::Timeout { transferred } | Self::IoFailure { transferred, .. } => *transferred,
            _ => 0,
        }
    }

    /// Whether this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Timeout { .. } => io::Error::new(io::ErrorKind::TimedOut, err),
            Error::InvalidParameter(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::AlreadyClosed => io::Error::new(io::ErrorKind::NotConnected, err),
            Error::IoFailure { source, .. } => source,
            Error::OpenFailed { source, .. }
            | Error::QueryFailed(source)
            | Error::ApplyFailed(source) => source,
        }
    }
}
