//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates a device without requiring
//! actual hardware. Clones share state, so a test can keep one handle to feed
//! data or inspect writes while the harness owns another.

use super::error::PortError;
use super::traits::{PortConfiguration, PortOpener, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Inner state of the mock port.
#[derive(Debug, Default)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// Canned responses, enqueued when the matching write happens.
    responders: VecDeque<(Vec<u8>, Vec<u8>)>,
    /// Whether the next read should time out.
    should_timeout: bool,
    /// Error kind returned by the next read, if any.
    fail_next_read: Option<std::io::ErrorKind>,
    /// Once set, an empty queue reads as end of stream instead of "no data yet".
    remote_closed: bool,
    /// Configured timeout duration.
    timeout: Duration,
    /// Delay applied to every read that returns data.
    read_delay: Duration,
    /// Whether buffers have been cleared.
    buffers_cleared: bool,
    /// Number of `close` calls observed.
    close_count: usize,
}

/// Mock serial port implementation for testing.
///
/// # Example
/// ```
/// use hil_testops::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.respond_to(b"unit_tests\r", b"Status: PASSED\r\n");
///
/// port.write_bytes(b"unit_tests\r").unwrap();
///
/// let mut buffer = [0u8; 32];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Status: PASSED\r\n");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_secs(1),
                ..Default::default()
            })),
        }
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Enqueue one `\r\n` terminated line.
    pub fn enqueue_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.read_queue.extend(line.as_bytes());
        state.read_queue.extend(b"\r\n");
    }

    /// When `trigger` is written, append `response` to the read queue.
    ///
    /// Responders fire in registration order, each at most once.
    pub fn respond_to(&self, trigger: &[u8], response: &[u8]) {
        self.state
            .lock()
            .responders
            .push_back((trigger.to_vec(), response.to_vec()));
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Set whether the next read operation should time out.
    pub fn set_should_timeout(&self, should_timeout: bool) {
        self.state.lock().should_timeout = should_timeout;
    }

    /// Make the next read fail with an I/O error of the given kind.
    pub fn fail_next_read(&self, kind: std::io::ErrorKind) {
        self.state.lock().fail_next_read = Some(kind);
    }

    /// Slow the port down: every read that has data waits `delay` first.
    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = delay;
    }

    /// Simulate the device hanging up once the queued bytes are drained.
    pub fn close_remote(&self) {
        self.state.lock().remote_closed = true;
    }

    /// Get whether buffers have been cleared.
    pub fn was_cleared(&self) -> bool {
        self.state.lock().buffers_cleared
    }

    /// Number of times `close` was called on any clone of this port.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        state.write_log.push(data.to_vec());

        let fires = state
            .responders
            .front()
            .is_some_and(|(trigger, _)| trigger.as_slice() == data);
        if fires {
            if let Some((_, response)) = state.responders.pop_front() {
                state.read_queue.extend(response);
            }
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let delay = {
            let state = self.state.lock();
            if state.read_queue.is_empty() {
                Duration::ZERO
            } else {
                state.read_delay
            }
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }
        if let Some(kind) = state.fail_next_read.take() {
            return Err(PortError::Io(std::io::Error::new(kind, "injected read failure")));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 && !state.remote_closed {
            Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.read_queue.clear();
        state.buffers_cleared = true;
        Ok(())
    }

    fn bytes_to_read(&self) -> Option<usize> {
        let state = self.state.lock();
        // A pending failure must be observable by pollers.
        if state.fail_next_read.is_some() || state.should_timeout {
            return Some(state.read_queue.len().max(1));
        }
        Some(state.read_queue.len())
    }

    fn try_clone_port(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(self.clone()))
    }

    fn close(&mut self) -> Result<(), PortError> {
        self.state.lock().close_count += 1;
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

/// Hands out registered mock ports by address.
///
/// Unknown addresses fail with [`PortError::NotFound`], which is how tests
/// simulate a device that enumerates but cannot be opened.
#[derive(Debug, Clone, Default)]
pub struct MockPortOpener {
    ports: Arc<Mutex<HashMap<String, MockSerialPort>>>,
    opened: Arc<Mutex<Vec<(String, PortConfiguration)>>>,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `port` under its own name.
    pub fn register(&self, port: &MockSerialPort) {
        self.ports.lock().insert(port.name.clone(), port.clone());
    }

    /// Every successful open so far, in order.
    pub fn opened(&self) -> Vec<(String, PortConfiguration)> {
        self.opened.lock().clone()
    }
}

impl PortOpener for MockPortOpener {
    fn open(
        &self,
        address: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let port = self
            .ports
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| PortError::not_found(address))?;
        self.opened
            .lock()
            .push((address.to_string(), config.clone()));
        Ok(Box::new(port))
    }
}
