//! Configuration module.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! 1. `--config <path>` on the command line
//! 2. `TESTOPS_CONFIG` environment variable
//! 3. `./testops.toml`
//! 4. `~/.config/testops/testops.toml` (XDG on Linux/macOS)
//! 5. `%APPDATA%\testops\testops.toml` (Windows)
//! 6. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `TESTOPS_<SECTION>_<KEY>`:
//! - `TESTOPS_DEVICE_PORT=/dev/ttyACM0`
//! - `TESTOPS_MONITOR_PORT=/dev/ttyUSB0`
//! - `TESTOPS_OUTPUT_DIR=artifacts`
//!
//! # Example
//!
//! ```toml
//! [device]
//! port = "auto"
//! line_timeout_ms = 600000
//!
//! [monitor]
//! port = "/dev/ttyUSB0"
//!
//! [output]
//! dir = "artifacts"
//! write_json = true
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader};
pub use schema::{
    Config, DeviceConfig, LogFormat, LoggingConfig, OutputConfig, SecondaryConfig,
};
