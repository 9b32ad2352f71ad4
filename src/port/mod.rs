//! Port abstraction layer for serial communication.
//!
//! Provides the `SerialPortAdapter` / `PortOpener` traits, the real
//! `serialport`-backed implementation, mocks for tests, and `Session`, the
//! line-buffered handle the harness reads from.

pub mod error;
pub mod mock;
pub mod session;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockPortOpener, MockSerialPort};
pub use session::{Session, SessionCloser};
pub use sync_port::{SyncSerialPort, SystemPortOpener};
pub use traits::*;
