//! Configuration schema definitions.
//!
//! Every section uses `#[serde(default)]`, so a config file only needs the
//! keys it wants to change.

use crate::device::PortSelector;
use crate::monitor::MonitorConfig;
use crate::port::PortConfiguration;
use crate::report::RunOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Primary device connection
    pub device: DeviceConfig,
    /// Optional secondary channel
    pub monitor: SecondaryConfig,
    /// Output artifacts
    pub output: OutputConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Primary device section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Port address, or "auto" to find the device by USB id
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout of the primary port
    pub read_timeout_ms: u64,
    /// Longest wait for one line of test output; unset waits for the device
    pub line_timeout_ms: Option<u64>,
    /// Budget for reading up to the shell prompt after the summary
    pub trailing_timeout_ms: u64,
    /// Pause between discovery attempts
    pub retry_delay_ms: u64,
    /// Discovery attempts for `run-units`
    pub run_attempts: u32,
    /// Discovery attempts for `await-device`
    pub await_attempts: u32,
    /// USB vendor id used by auto discovery
    pub usb_vid: u16,
    /// USB product id used by auto discovery
    pub usb_pid: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: "auto".to_string(),
            baud_rate: 230_400,
            read_timeout_ms: 1000,
            line_timeout_ms: None,
            trailing_timeout_ms: 2000,
            retry_delay_ms: 1000,
            run_attempts: 10,
            await_attempts: 10,
            usb_vid: 0x0483,
            usb_pid: 0x5740,
        }
    }
}

impl DeviceConfig {
    pub fn selector(&self) -> PortSelector {
        match self.port.parse() {
            Ok(selector) => selector,
            Err(never) => match never {},
        }
    }

    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration::new(self.baud_rate, Duration::from_millis(self.read_timeout_ms))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            send_trigger: true,
            line_timeout: self.line_timeout_ms.map(Duration::from_millis),
            trailing_timeout: Duration::from_millis(self.trailing_timeout_ms),
        }
    }
}

/// Secondary channel section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryConfig {
    /// Port to monitor alongside the device; unset disables monitoring
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub join_timeout_ms: u64,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 230_400,
            read_timeout_ms: 1000,
            poll_interval_ms: 10,
            join_timeout_ms: 1000,
        }
    }
}

impl SecondaryConfig {
    /// Monitor settings, if a secondary port is configured.
    pub fn monitor_config(&self) -> Option<MonitorConfig> {
        let address = self.port.as_deref()?;
        Some(MonitorConfig {
            address: address.to_string(),
            port: PortConfiguration::new(
                self.baud_rate,
                Duration::from_millis(self.read_timeout_ms),
            ),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            join_timeout: Duration::from_millis(self.join_timeout_ms),
        })
    }
}

/// Output artifact section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the artifacts are written to
    pub dir: PathBuf,
    pub transcript_file: String,
    pub secondary_file: String,
    pub report_file: String,
    /// Also write the report as JSON
    pub write_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            transcript_file: "unit_tests_output.txt".to_string(),
            secondary_file: "unit_tests_stm_output.txt".to_string(),
            report_file: "unit_tests_report.json".to_string(),
            write_json: false,
        }
    }
}

impl OutputConfig {
    pub fn transcript_path(&self) -> PathBuf {
        self.dir.join(&self.transcript_file)
    }

    pub fn secondary_path(&self) -> PathBuf {
        self.dir.join(&self.secondary_file)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(&self.report_file)
    }

    pub fn with_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.dir = dir.as_ref().to_path_buf();
        self
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level filter when `RUST_LOG` is unset: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Log file path; logs go to stderr when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}
