//! Error types for ipset operations.

use std::io;
use std::time::Duration;

/// Result type for ipset operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or sending ipset requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket creation or binding.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Set name does not fit the kernel's fixed-size name field.
    #[error("set name too long: '{name}' is {len} bytes, limit is 31")]
    NameTooLong {
        /// The offending set name.
        name: String,
        /// Its length in bytes (without terminator).
        len: usize,
    },

    /// Set name is empty or contains an interior NUL byte.
    #[error("invalid set name: {0:?}")]
    InvalidSetName(String),

    /// Encoding would overflow the fixed message buffer.
    #[error("message capacity exceeded: need {needed} bytes, capacity is {capacity}")]
    CapacityExceeded {
        /// Bytes the message would occupy.
        needed: usize,
        /// Buffer capacity.
        capacity: usize,
    },

    /// The socket kept reporting "would block" until the retry bound was hit.
    #[error("send retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Non-transient send failure.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// Value is neither an IP address nor a hardware address.
    #[error("value is neither an IP address nor a MAC address: {0}")]
    UnclassifiedInput(String),

    /// Operation not supported.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Async deadline elapsed before the request completed.
    #[error("deadline of {0:?} elapsed")]
    DeadlineElapsed(Duration),

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
}

impl Error {
    /// Check if this error was caused by the caller's input.
    ///
    /// Caller errors are detected before anything reaches the socket.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NameTooLong { .. }
                | Self::InvalidSetName(_)
                | Self::UnclassifiedInput(_)
                | Self::NotSupported(_)
        )
    }

    /// Check if this error may go away if the request is retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RetriesExhausted { .. } | Self::DeadlineElapsed(_) => true,
            Self::Send(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the OS errno if this error carries one.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Io(e) | Self::Send(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
