//! Port-specific error types.
//!
//! Kept separate from [`crate::error::HarnessError`] so the transport layer
//! can be used (and mocked) without knowing anything about test reports.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No delimiter arrived before the deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The device closed the stream (zero-byte read).
    #[error("End of stream")]
    EndOfStream,

    /// Attempted to use a session that has already been closed.
    #[error("Port is not open")]
    NotOpen,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// True for the per-read "nothing arrived yet" conditions.
    ///
    /// Real ports report `TimedOut` when the configured read timeout elapses,
    /// the mock reports `WouldBlock` when its queue is empty. Both mean "try
    /// again", never "the stream is broken".
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortError::not_found("/dev/ttyACM0");
        assert_eq!(err.to_string(), "Serial port not found: /dev/ttyACM0");

        let err = PortError::config("Invalid baud rate");
        assert_eq!(err.to_string(), "Configuration error: Invalid baud rate");

        assert_eq!(PortError::EndOfStream.to_string(), "End of stream");
    }

    #[test]
    fn test_timeout_error() {
        let err = PortError::timeout(Duration::from_millis(500));
        assert!(err.to_string().contains("500ms"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(PortError::timeout(Duration::from_secs(1)).is_transient());
        assert!(PortError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_transient());
        assert!(PortError::Io(std::io::Error::from(std::io::ErrorKind::WouldBlock)).is_transient());

        assert!(!PortError::EndOfStream.is_transient());
        assert!(!PortError::NotOpen.is_transient());
        assert!(!PortError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_transient());
    }
}
