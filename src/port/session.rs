//! Line-buffered session over one serial transport.
//!
//! A `Session` owns its port exclusively. It adds the two read primitives the
//! harness needs on top of raw byte reads: a deadline-bounded `read_until`
//! and a pyserial-style `read_line`. Closing is idempotent and also happens
//! on drop, so every exit path releases the transport exactly once.

use super::error::PortError;
use super::traits::{PortConfiguration, PortOpener, SerialPortAdapter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const READ_CHUNK: usize = 256;

/// Pause after a transient "no data" result so mock ports do not spin.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct Session {
    port: Option<Box<dyn SerialPortAdapter>>,
    name: String,
    buffer: Vec<u8>,
    closed: Arc<AtomicBool>,
}

impl Session {
    /// Wrap an already opened port.
    pub fn new(port: Box<dyn SerialPortAdapter>) -> Self {
        let name = port.name().to_string();
        Self {
            port: Some(port),
            name,
            buffer: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open `address` through `opener`.
    pub fn open(
        opener: &dyn PortOpener,
        address: &str,
        config: &PortConfiguration,
    ) -> Result<Self, PortError> {
        let port = opener.open(address, config)?;
        debug!(port = address, baud = config.baud_rate, "session opened");
        Ok(Self::new(port))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some() && !self.closed.load(Ordering::Acquire)
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPortAdapter>, PortError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PortError::NotOpen);
        }
        self.port.as_mut().ok_or(PortError::NotOpen)
    }

    /// A handle that closes this session from another thread.
    ///
    /// Whichever of the session and its closers closes first releases the
    /// port; the rest become no-ops.
    pub fn closer(&self) -> Result<SessionCloser, PortError> {
        let port = self.port.as_ref().ok_or(PortError::NotOpen)?;
        Ok(SessionCloser {
            port: Some(port.try_clone_port()?),
            name: self.name.clone(),
            closed: Arc::clone(&self.closed),
        })
    }

    /// Drop everything received so far, buffered or still in the driver.
    pub fn clear_input(&mut self) -> Result<(), PortError> {
        self.buffer.clear();
        self.port_mut()?.clear_buffers()
    }

    /// Write all of `data`.
    pub fn send(&mut self, data: &[u8]) -> Result<(), PortError> {
        let port = self.port_mut()?;
        let mut written = 0;
        while written < data.len() {
            match port.write_bytes(&data[written..])? {
                0 => {
                    return Err(PortError::Io(std::io::Error::from(
                        std::io::ErrorKind::WriteZero,
                    )))
                }
                n => written += n,
            }
        }
        trace!(port = %self.name, bytes = written, "sent");
        Ok(())
    }

    /// Bytes that a read would return without waiting, if the driver knows.
    pub fn bytes_available(&self) -> Option<usize> {
        if !self.is_open() {
            return None;
        }
        let port = self.port.as_ref()?;
        match port.bytes_to_read() {
            Some(n) => Some(n + self.buffer.len()),
            None if !self.buffer.is_empty() => Some(self.buffer.len()),
            None => None,
        }
    }

    /// Remove and return whatever is buffered but not yet consumed.
    pub fn take_buffered(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn fill(&mut self) -> Result<usize, PortError> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.port_mut()?.read_bytes(&mut chunk)?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Read until `delimiter` is seen.
    ///
    /// Per-read timeouts of the port are retried; only the call's own
    /// `timeout` ends the wait, with [`PortError::Timeout`]. `None` waits for
    /// as long as the port keeps the stream alive. Bytes read before a
    /// failure stay buffered for the next call.
    pub fn read_until(
        &mut self,
        delimiter: &[u8],
        strip_delimiter: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, PortError> {
        let started = Instant::now();
        loop {
            if let Some(pos) = memchr::memmem::find(&self.buffer, delimiter) {
                let mut line: Vec<u8> = self.buffer.drain(..pos + delimiter.len()).collect();
                if strip_delimiter {
                    line.truncate(pos);
                }
                return Ok(line);
            }

            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(PortError::timeout(limit));
                }
            }

            match self.fill() {
                Ok(0) => return Err(PortError::EndOfStream),
                Ok(_) => {}
                Err(e) if e.is_transient() => std::thread::sleep(IDLE_BACKOFF),
                Err(e) => return Err(e),
            }
        }
    }

    /// Read one `\n` terminated line, or whatever arrived before the port's
    /// read timeout. May return an empty vector.
    pub fn read_line(&mut self) -> Result<Vec<u8>, PortError> {
        loop {
            if let Some(pos) = memchr::memchr(b'\n', &self.buffer) {
                return Ok(self.buffer.drain(..=pos).collect());
            }

            match self.fill() {
                Ok(0) if self.buffer.is_empty() => return Err(PortError::EndOfStream),
                Ok(0) => return Ok(self.take_buffered()),
                Ok(_) => {}
                Err(e) if e.is_transient() => return Ok(self.take_buffered()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Release the transport. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), PortError> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        self.buffer.clear();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(port = %self.name, "session closed");
        port.close()
    }
}

/// Closes a [`Session`] without access to it, see [`Session::closer`].
#[derive(Debug)]
pub struct SessionCloser {
    port: Option<Box<dyn SerialPortAdapter>>,
    name: String,
    closed: Arc<AtomicBool>,
}

impl SessionCloser {
    /// Release the session's port unless it is already closed.
    pub fn close(&mut self) -> Result<(), PortError> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(port = %self.name, "session closed by handle");
        port.close()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
