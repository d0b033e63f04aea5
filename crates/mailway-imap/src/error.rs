//! Error types for the IMAP library.
//!
//! A server-returned `NO` or `BAD` is not an error: it is carried on the
//! reply record and inspected via [`crate::protocol::Reply::succeeded`].
//! Errors are reserved for transport failures, framing violations, and
//! API misuse.

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Port or protocol name not recognised.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// TCP or TLS failure, invalid or missing greeting, or STARTTLS
    /// refused while the TLS mode requires it.
    #[error("Cannot connect: {message}")]
    CannotConnect {
        /// Description of what went wrong.
        message: String,
        /// Underlying I/O or TLS cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport write failure or literal continuation refused.
    #[error("Send failed: {message}")]
    SendFailed {
        /// Description of what went wrong.
        message: String,
        /// Underlying I/O cause, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Transport read failure or timeout.
    #[error("Receive failed: {message}")]
    ReceiveFailed {
        /// Description of what went wrong.
        message: String,
        /// Whether the failure was a timeout.
        timeout: bool,
        /// Underlying I/O cause, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Error during orderly shutdown.
    #[error("Close failed: {0}")]
    CloseFailed(String),

    /// Tag token unparseable or unmatched to any running command.
    #[error("Unexpected tag: {0}")]
    UnexpectedTag(String),

    /// Tagged status word other than OK/NO/BAD, or malformed response data.
    #[error("Unexpected data: {0}")]
    UnexpectedData(String),

    /// Operation on a command after dispose, or on a layer after close.
    #[error("Object disposed: {0}")]
    DisposedObject(&'static str),

    /// Reset or queue attempted while the command is queued or running.
    #[error("Command busy: {0}")]
    CommandBusy(&'static str),

    /// Execute or complete called from a state that does not permit it.
    #[error("Invalid command state: {0}")]
    CommandState(String),

    /// Out-of-range or ill-formed builder input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value that must be zero was not.
    #[error("Value must be zero: {0}")]
    MustBeZero(&'static str),

    /// A value that must be non-zero was zero.
    #[error("Value must be non-zero: {0}")]
    MustBeNonZero(&'static str),

    /// Create-by-name for an unknown command class.
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Discriminant-only view of [`Error`] for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ErrorKind {
    UnknownProtocol,
    CannotConnect,
    SendFailed,
    ReceiveFailed,
    CloseFailed,
    UnexpectedTag,
    UnexpectedData,
    DisposedObject,
    CommandBusy,
    CommandState,
    InvalidArgument,
    MustBeZero,
    MustBeNonZero,
    NotImplemented,
}

impl Error {
    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownProtocol(_) => ErrorKind::UnknownProtocol,
            Self::CannotConnect { .. } => ErrorKind::CannotConnect,
            Self::SendFailed { .. } => ErrorKind::SendFailed,
            Self::ReceiveFailed { .. } => ErrorKind::ReceiveFailed,
            Self::CloseFailed(_) => ErrorKind::CloseFailed,
            Self::UnexpectedTag(_) => ErrorKind::UnexpectedTag,
            Self::UnexpectedData(_) => ErrorKind::UnexpectedData,
            Self::DisposedObject(_) => ErrorKind::DisposedObject,
            Self::CommandBusy(_) => ErrorKind::CommandBusy,
            Self::CommandState(_) => ErrorKind::CommandState,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::MustBeZero(_) => ErrorKind::MustBeZero,
            Self::MustBeNonZero(_) => ErrorKind::MustBeNonZero,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
        }
    }

    /// Returns true if this error was caused by an I/O timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::ReceiveFailed { timeout: true, .. })
    }

    /// Builds a [`Error::CannotConnect`] without an inner cause.
    #[must_use]
    pub fn cannot_connect(message: impl Into<String>) -> Self {
        Self::CannotConnect {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a [`Error::SendFailed`] without an inner cause.
    #[must_use]
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::SendFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a [`Error::ReceiveFailed`] without an inner cause.
    #[must_use]
    pub fn receive_failed(message: impl Into<String>) -> Self {
        Self::ReceiveFailed {
            message: message.into(),
            timeout: false,
            source: None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::UnknownProtocol("gopher".to_string()).kind(),
            ErrorKind::UnknownProtocol
        );
        assert_eq!(
            Error::cannot_connect("refused").kind(),
            ErrorKind::CannotConnect
        );
        assert_eq!(Error::CommandBusy("queued").kind(), ErrorKind::CommandBusy);
    }

    #[test]
    fn test_timeout_flag() {
        let err = Error::ReceiveFailed {
            message: "read timed out".to_string(),
            timeout: true,
            source: None,
        };
        assert!(err.is_timeout());
        assert!(!Error::receive_failed("closed").is_timeout());
    }

    #[test]
    fn test_display() {
        let err = Error::send_failed("continuation refused");
        assert_eq!(err.to_string(), "Send failed: continuation refused");
    }
}
