//! Background capture of a secondary serial channel.
//!
//! The reader thread owns the monitor's [`Session`]; the monitor keeps a
//! [`SessionCloser`] so `stop` can release the port even while a read is
//! blocked. The thread polls for input, appends every line to the monitor's
//! log and publishes it on a channel for live consumers. It never propagates
//! errors: a broken secondary channel leaves a diagnostic line in the log and
//! ends capture, the primary run carries on.

use crate::error::{HarnessError, HarnessResult};
use crate::port::{PortConfiguration, PortOpener, Session, SessionCloser};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of a [`StreamMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

/// Where and how to monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub address: String,
    /// Baud rate and the short per-read timeout that bounds each read.
    pub port: PortConfiguration,
    /// Sleep between polls while no input is pending.
    pub poll_interval: Duration,
    /// Longest `stop` waits for the reader thread.
    pub join_timeout: Duration,
}

impl MonitorConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: PortConfiguration::new(230_400, Duration::from_secs(1)),
            poll_interval: Duration::from_millis(10),
            join_timeout: Duration::from_secs(1),
        }
    }
}

/// Captured lines. Sealed by `stop`, after which late reads are dropped.
#[derive(Debug, Default)]
struct Capture {
    lines: Vec<String>,
    sealed: bool,
}

#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    state: Mutex<MonitorState>,
    capture: Mutex<Capture>,
}

impl Shared {
    /// Append `line` and publish it. False once the capture is sealed.
    fn record(&self, sender: &Sender<String>, line: String) -> bool {
        let mut capture = self.capture.lock();
        if capture.sealed {
            return false;
        }
        capture.lines.push(line.clone());
        drop(capture);
        let _ = sender.send(line);
        true
    }
}

#[derive(Debug)]
struct Worker {
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

#[derive(Debug)]
pub struct StreamMonitor {
    config: MonitorConfig,
    shared: Arc<Shared>,
    sender: Option<Sender<String>>,
    receiver: Receiver<String>,
    closer: Option<SessionCloser>,
    worker: Option<Worker>,
}

impl StreamMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                state: Mutex::new(MonitorState::Idle),
                capture: Mutex::new(Capture::default()),
            }),
            sender: Some(sender),
            receiver,
            closer: None,
            worker: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn state(&self) -> MonitorState {
        *self.shared.state.lock()
    }

    /// A receiver for lines as they arrive.
    ///
    /// Receivers share one queue: with several subscribers each line goes to
    /// exactly one of them. The log behind [`Self::collected_output`] always
    /// sees every line.
    pub fn subscribe(&self) -> Receiver<String> {
        self.receiver.clone()
    }

    /// Open the secondary port and start the reader thread.
    ///
    /// Does nothing unless the monitor is `Idle`. A failed start leaves it
    /// `Idle`, so the call can be retried.
    pub fn start(&mut self, opener: &dyn PortOpener) -> HarnessResult<()> {
        if self.state() != MonitorState::Idle {
            return Ok(());
        }
        let Some(sender) = self.sender.clone() else {
            return Ok(());
        };

        let start_error = |source| HarnessError::SecondaryChannelStart {
            port: self.config.address.clone(),
            source,
        };

        let mut session = Session::open(opener, &self.config.address, &self.config.port)
            .map_err(start_error)?;
        let closer = match session.closer() {
            Ok(closer) => closer,
            Err(e) => {
                let _ = session.close();
                return Err(start_error(e));
            }
        };

        self.shared.running.store(true, Ordering::Release);
        *self.shared.state.lock() = MonitorState::Running;

        let (exit_sender, exited) = crossbeam_channel::bounded(1);
        let shared = Arc::clone(&self.shared);
        let poll_interval = self.config.poll_interval;

        let spawned = thread::Builder::new()
            .name("stream-monitor".to_string())
            .spawn(move || {
                capture_loop(&shared, &mut session, &sender, poll_interval);
                let _ = exit_sender.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // The closure, and with it the session, is dropped on failure.
                self.shared.running.store(false, Ordering::Release);
                *self.shared.state.lock() = MonitorState::Idle;
                return Err(start_error(e.into()));
            }
        };

        info!(port = %self.config.address, "secondary monitor started");
        self.closer = Some(closer);
        self.worker = Some(Worker { handle, exited });
        Ok(())
    }

    /// Stop capturing and release the port.
    ///
    /// Returns within `join_timeout` even if the reader is stuck in a read;
    /// the port is closed either way. Safe to call in any state and any
    /// number of times; always leaves the monitor `Stopped`.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.sender = None;

        if let Some(worker) = self.worker.take() {
            match worker.exited.recv_timeout(self.config.join_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if worker.handle.join().is_err() {
                        warn!("secondary monitor thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout = ?self.config.join_timeout,
                        "secondary monitor did not stop in time, detaching"
                    );
                }
            }
        }

        self.shared.capture.lock().sealed = true;

        if let Some(mut closer) = self.closer.take() {
            if let Err(e) = closer.close() {
                warn!("failed to close secondary port: {e}");
            }
        }

        let mut state = self.shared.state.lock();
        if *state != MonitorState::Stopped {
            debug!(port = %self.config.address, "secondary monitor stopped");
        }
        *state = MonitorState::Stopped;
    }

    /// Everything captured so far, in arrival order.
    ///
    /// While running this is a snapshot; after [`Self::stop`] it is final.
    pub fn collected_output(&self) -> String {
        self.shared.capture.lock().lines.concat()
    }
}

impl Drop for StreamMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    shared: &Shared,
    session: &mut Session,
    sender: &Sender<String>,
    poll_interval: Duration,
) {
    while shared.running.load(Ordering::Acquire) && session.is_open() {
        if session.bytes_available() == Some(0) {
            thread::sleep(poll_interval);
            continue;
        }

        match session.read_line() {
            Ok(raw) if raw.is_empty() => {}
            Ok(raw) => {
                let line = String::from_utf8_lossy(&raw).into_owned();
                if !shared.record(sender, line) {
                    break;
                }
            }
            // Closed underneath us by `stop`.
            Err(_) if !shared.running.load(Ordering::Acquire) => break,
            Err(e) => {
                warn!("secondary channel read failed: {e}");
                shared.record(sender, format!("Error reading serial: {e}"));
                *shared.state.lock() = MonitorState::Stopped;
                break;
            }
        }
    }

    let _ = session.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockPortOpener, MockSerialPort};
    use std::time::Instant;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn monitored_port(name: &str) -> (MockPortOpener, MockSerialPort) {
        let opener = MockPortOpener::new();
        let port = MockSerialPort::new(name);
        opener.register(&port);
        (opener, port)
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/ttyUSB1"));
        assert_eq!(monitor.state(), MonitorState::Idle);

        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(monitor.collected_output(), "");
    }

    #[test]
    fn test_start_failure_is_reported() {
        let opener = MockPortOpener::new();
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/missing"));

        match monitor.start(&opener) {
            Err(HarnessError::SecondaryChannelStart { port, .. }) => {
                assert_eq!(port, "/dev/missing")
            }
            other => panic!("expected start failure, got {:?}", other),
        }
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn test_start_can_be_retried_after_failure() {
        let opener = MockPortOpener::new();
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/ttyUSB1"));
        assert!(monitor.start(&opener).is_err());

        let port = MockSerialPort::new("/dev/ttyUSB1");
        opener.register(&port);
        monitor.start(&opener).unwrap();
        assert_eq!(monitor.state(), MonitorState::Running);
        assert_eq!(opener.opened().len(), 1);

        port.enqueue_read(b"late boot\n");
        assert!(wait_for(|| monitor.collected_output() == "late boot\n"));
        monitor.stop();
        assert_eq!(port.close_count(), 1);
    }

    #[test]
    fn test_stop_is_bounded_and_closes_while_reader_is_blocked() {
        let (opener, port) = monitored_port("/dev/ttyUSB1");
        port.enqueue_read(b"slow line\n");
        port.set_read_delay(Duration::from_secs(3));

        let mut config = MonitorConfig::new("/dev/ttyUSB1");
        config.join_timeout = Duration::from_millis(200);
        let mut monitor = StreamMonitor::new(config);
        monitor.start(&opener).unwrap();
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        monitor.stop();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_millis(500),
            "stop took {elapsed:?}"
        );
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(port.close_count(), 1);
        assert_eq!(monitor.collected_output(), "");
    }

    #[test]
    fn test_captures_lines_in_order() {
        let (opener, port) = monitored_port("/dev/ttyUSB1");
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/ttyUSB1"));
        monitor.start(&opener).unwrap();
        assert_eq!(monitor.state(), MonitorState::Running);

        port.enqueue_read(b"boot\n");
        port.enqueue_read(b"heap ok\n");
        assert!(wait_for(|| monitor.collected_output() == "boot\nheap ok\n"));

        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(monitor.collected_output(), "boot\nheap ok\n");
        assert_eq!(port.close_count(), 1);
    }

    #[test]
    fn test_uses_configured_baud_rate() {
        let (opener, _port) = monitored_port("/dev/ttyUSB1");
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/ttyUSB1"));
        monitor.start(&opener).unwrap();
        monitor.stop();

        let opened = opener.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].1.baud_rate, 230_400);
    }

    #[test]
    fn test_subscriber_receives_lines() {
        let (opener, port) = monitored_port("/dev/ttyUSB1");
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/ttyUSB1"));
        let lines = monitor.subscribe();
        monitor.start(&opener).unwrap();

        port.enqueue_read(b"hello\n");
        assert_eq!(
            lines.recv_timeout(Duration::from_secs(2)).unwrap(),
            "hello\n"
        );
        monitor.stop();
    }

    #[test]
    fn test_read_failure_leaves_marker_and_stops() {
        let (opener, port) = monitored_port("/dev/ttyUSB1");
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/ttyUSB1"));
        monitor.start(&opener).unwrap();

        port.enqueue_read(b"before\n");
        assert!(wait_for(|| monitor.collected_output() == "before\n"));
        port.fail_next_read(std::io::ErrorKind::BrokenPipe);

        assert!(wait_for(|| monitor.state() == MonitorState::Stopped));
        let output = monitor.collected_output();
        assert!(output.starts_with("before\nError reading serial:"));

        monitor.stop();
        assert_eq!(port.close_count(), 1);
    }

    #[test]
    fn test_start_twice_opens_once() {
        let (opener, _port) = monitored_port("/dev/ttyUSB1");
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/ttyUSB1"));
        monitor.start(&opener).unwrap();
        monitor.start(&opener).unwrap();
        monitor.stop();
        assert_eq!(opener.opened().len(), 1);
    }

    #[test]
    fn test_drop_stops_and_closes() {
        let (opener, port) = monitored_port("/dev/ttyUSB1");
        let mut monitor = StreamMonitor::new(MonitorConfig::new("/dev/ttyUSB1"));
        monitor.start(&opener).unwrap();
        drop(monitor);
        assert_eq!(port.close_count(), 1);
    }
}
