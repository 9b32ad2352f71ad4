//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` lets real hardware ports and mock ports be used
//! interchangeably; `PortOpener` is the seam through which sessions get
//! created, so the retry loop and the monitor can be driven by mocks.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration parameters for a serial port.
///
/// Ports are always opened 8N1 without flow control; the device CDC
/// interface ignores line settings besides the baud rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Per-read timeout.
    pub timeout: Duration,
}

impl PortConfiguration {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 230_400,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Trait for serial port I/O operations.
///
/// This trait abstracts over synchronous serial port operations, allowing both
/// real hardware ports and mock implementations for testing.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read. `Ok(0)` means the other end
    /// went away.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Clear both input and output buffers.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// Get the current bytes available to read (if supported).
    ///
    /// Returns `None` if the operation is not supported or cannot be determined.
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }

    /// A second handle to the same transport.
    ///
    /// Lets another thread close the port while a read is blocked on it.
    fn try_clone_port(&self) -> Result<Box<dyn SerialPortAdapter>, PortError>;

    /// Release the underlying transport.
    ///
    /// Real ports are released on drop, so the default does nothing.
    fn close(&mut self) -> Result<(), PortError> {
        Ok(())
    }
}

/// Opens serial transports by address.
pub trait PortOpener: Send + Sync {
    fn open(
        &self,
        address: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = PortConfiguration::default();
        assert_eq!(config.baud_rate, 230_400);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }
}
