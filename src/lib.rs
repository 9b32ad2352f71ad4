//! Hardware-in-the-loop test operations.
//!
//! Finds a device on a serial port, triggers its built-in unit tests, parses
//! the textual report it prints and turns it into CI artifacts and an exit
//! status. A second serial port can be captured alongside the run.
//!
//! # Modules
//!
//! - `port`: serial transport traits, real and mock ports, line-buffered `Session`
//! - `device`: port selection and the bounded acquire/retry loop
//! - `monitor`: background capture of a secondary port
//! - `report`: trigger, line classification and the `TestReport` model
//! - `harness`: the `await-device` and `run-units` flows
//! - `artifacts`: transcript and JSON report files
//! - `config`: TOML configuration with environment overrides
//! - `logging`: `tracing` subscriber setup
//! - `error`: unified error handling

pub mod artifacts;
pub mod config;
pub mod device;
pub mod error;
pub mod harness;
pub mod logging;
pub mod monitor;
pub mod port;
pub mod report;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigLoader};
pub use device::{DeviceLocator, DeviceResolver, PortSelector, UsbDeviceResolver};
pub use error::{HarnessError, HarnessResult};
pub use harness::Harness;
pub use monitor::{MonitorConfig, MonitorState, StreamMonitor};
pub use port::{
    MockPortOpener, MockSerialPort, PortConfiguration, PortError, PortOpener, SerialPortAdapter,
    Session, SyncSerialPort, SystemPortOpener,
};
pub use report::{Field, ReportParser, RunOptions, TestReport};
