//! Error handling for possim
//!
//! Errors are split by the layer that raises them:
//! - Transport errors (open/read/write/flush on a serial port or socket)
//! - Protocol errors (malformed, short or unrecognised frames)
//! - Device errors (offline, timeouts and operations refused in the current state)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Transport error type
///
/// Raised by the byte channel to the simulated controller. Always
/// recoverable by reopening the transport on next use.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Failed to open the transport
    #[error("Failed to open {target}: {reason}")]
    FailedToOpen {
        /// The target that failed to open.
        target: String,
        /// The reason the target failed to open.
        reason: String,
    },

    /// Operation requires an open transport
    #[error("Transport not open")]
    NotOpen,

    /// Peer closed the connection
    #[error("Connection closed by {target}")]
    Closed {
        /// The target that closed the connection.
        target: String,
    },

    /// Read failure
    #[error("Read error: {reason}")]
    Read {
        /// The reason for the read error.
        reason: String,
    },

    /// Write failure
    #[error("Write error: {reason}")]
    Write {
        /// The reason for the write error.
        reason: String,
    },

    /// Flush failure
    #[error("Flush error: {reason}")]
    Flush {
        /// The reason for the flush error.
        reason: String,
    },

    /// Target address could not be parsed or resolved
    #[error("Invalid target: {target}")]
    InvalidTarget {
        /// The invalid target string.
        target: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Protocol error type
///
/// Raised by status decoders and response checkers. The poller treats
/// these exactly like transport errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame shorter or longer than its fixed layout
    #[error("Frame length {actual}, expected {expected}")]
    FrameLength {
        /// The expected frame length.
        expected: usize,
        /// The received frame length.
        actual: usize,
    },

    /// Fixed-width frame without its terminator
    #[error("Frame not terminated: {frame}")]
    MissingTerminator {
        /// Escaped frame content.
        frame: String,
    },

    /// Command letter not part of the dialect
    #[error("Unknown command '{command}'")]
    UnknownCommand {
        /// The unrecognised command.
        command: String,
    },

    /// Field value out of range
    #[error("Invalid value for {field}: {value}")]
    InvalidValue {
        /// The field that carried the value.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Response does not answer the request
    #[error("Response mismatch: {reason}")]
    ResponseMismatch {
        /// The reason the response was rejected.
        reason: String,
    },

    /// No response arrived
    #[error("No response after {attempts} attempt(s)")]
    NoResponse {
        /// Number of attempts made.
        attempts: u32,
    },
}

/// Device error type
///
/// What application-facing calls observe: the device being offline,
/// a bounded wait running out, or a request refused before any I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Communication with the device is down
    #[error("Device offline")]
    Offline,

    /// No answer within the call's budget
    #[error("Device operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Operation not allowed in the current state
    #[error("Illegal operation: {reason}")]
    Illegal {
        /// Why the operation was refused.
        reason: String,
    },

    /// Device already claimed by another session
    #[error("Device claimed: {reason}")]
    Claimed {
        /// Who holds the claim.
        reason: String,
    },

    /// Operation requires a claimed session
    #[error("Device not claimed")]
    NotClaimed,

    /// Device reported a failure
    #[error("Device failure: {reason}")]
    Failure {
        /// The reason for the failure.
        reason: String,
    },
}

impl DeviceError {
    /// Shorthand for [`DeviceError::Illegal`]
    pub fn illegal(reason: impl Into<String>) -> Self {
        DeviceError::Illegal {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`DeviceError::Failure`]
    pub fn failure(reason: impl Into<String>) -> Self {
        DeviceError::Failure {
            reason: reason.into(),
        }
    }

    /// Timeout error from a duration
    pub fn timeout(timeout: std::time::Duration) -> Self {
        DeviceError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

/// Main error type for possim
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Device error
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Device(DeviceError::Timeout { .. }))
    }

    /// Check if the device was reported offline
    pub fn is_offline(&self) -> bool {
        matches!(self, Error::Device(DeviceError::Offline))
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Errors the poller handles by flipping the connection offline
    pub fn is_communication_error(&self) -> bool {
        self.is_transport_error() || self.is_protocol_error()
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::FailedToOpen {
            target: "127.0.0.1:6000".to_string(),
            reason: "refused".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open 127.0.0.1:6000: refused");
        assert_eq!(TransportError::NotOpen.to_string(), "Transport not open");
    }

    #[test]
    fn test_device_error_helpers() {
        assert_eq!(
            DeviceError::timeout(Duration::from_millis(1000)),
            DeviceError::Timeout { timeout_ms: 1000 }
        );
        assert_eq!(
            DeviceError::illegal("drawer open").to_string(),
            "Illegal operation: drawer open"
        );
    }

    #[test]
    fn test_error_classification() {
        let err: Error = TransportError::NotOpen.into();
        assert!(err.is_transport_error());
        assert!(err.is_communication_error());

        let err: Error = ProtocolError::NoResponse { attempts: 2 }.into();
        assert!(err.is_protocol_error());
        assert!(err.is_communication_error());

        let err: Error = DeviceError::Offline.into();
        assert!(err.is_offline());
        assert!(!err.is_communication_error());

        let err: Error = DeviceError::Timeout { timeout_ms: 5 }.into();
        assert!(err.is_timeout());
    }
}
