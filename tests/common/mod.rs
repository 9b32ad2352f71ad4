//! Shared test utilities for the harness integration tests.
//!
//! - Device output builders in the device's wire format
//! - A mock rig: opener, primary device and a config that never sleeps

#![allow(dead_code)]

use hil_testops::report::{LINE_DELIMITER, PROMPT_MARKER, TRIGGER_COMMAND};
use hil_testops::{Config, MockPortOpener, MockSerialPort};

pub const DEVICE_PORT: &str = "/dev/ttyACM0";
pub const SECONDARY_PORT: &str = "/dev/ttyUSB0";

pub const PASSING_RUN: &[&str] = &[
    "Running test suite",
    "test_furi()",
    "test_storage()",
    "test_infrared()",
    "Failed tests: 0",
    "Consumed: 15342",
    "Leaked: 128",
    "Status: PASSED",
];

pub const FAILING_RUN: &[&str] = &[
    "test_furi()",
    "test_storage()",
    "test_storage.c:41: assertion failed",
    "Failed tests: 1",
    "Consumed: 9000",
    "Leaked: 0",
    "Status: FAILED",
];

/// CRLF-terminated lines, optionally followed by the shell prompt.
pub fn device_output(lines: &[&str], prompt: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(LINE_DELIMITER);
    }
    if prompt {
        out.extend_from_slice(PROMPT_MARKER);
    }
    out
}

/// A registered primary device and the config pointing at it.
pub struct Rig {
    pub opener: MockPortOpener,
    pub device: MockSerialPort,
    pub config: Config,
}

impl Rig {
    pub fn new() -> Self {
        let opener = MockPortOpener::new();
        let device = MockSerialPort::new(DEVICE_PORT);
        opener.register(&device);

        let mut config = Config::default();
        config.device.port = DEVICE_PORT.to_string();
        config.device.retry_delay_ms = 0;
        config.device.run_attempts = 2;
        config.device.trailing_timeout_ms = 200;

        Self {
            opener,
            device,
            config,
        }
    }

    /// Answer the trigger command with `lines` and a prompt.
    pub fn replying(self, lines: &[&str]) -> Self {
        self.device
            .respond_to(TRIGGER_COMMAND, &device_output(lines, true));
        self
    }

    /// Register a secondary port and point the monitor config at it.
    pub fn with_secondary(&mut self) -> MockSerialPort {
        let secondary = MockSerialPort::new(SECONDARY_PORT);
        self.opener.register(&secondary);
        self.config.monitor.port = Some(SECONDARY_PORT.to_string());
        self.config.monitor.poll_interval_ms = 1;
        secondary
    }
}
