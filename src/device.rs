//! Finding the device and opening the primary session.
//!
//! [`DeviceLocator::acquire`] is a bounded retry loop around a
//! [`DeviceResolver`]: the device may still be rebooting or enumerating when
//! a CI job starts, so a miss is retried after a fixed delay.

use crate::error::{HarnessError, HarnessResult};
use crate::port::{PortConfiguration, PortOpener, Session};
use serialport::SerialPortType;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which port to use: a fixed address or the first matching USB device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    Auto,
    Explicit(String),
}

impl FromStr for PortSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") || s.is_empty() {
            Ok(Self::Auto)
        } else {
            Ok(Self::Explicit(s.to_string()))
        }
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(address) => f.write_str(address),
        }
    }
}

/// Maps a selector to a transport address, if the device is present.
///
/// Must be cheap and side-effect free; it is polled.
pub trait DeviceResolver: Send + Sync {
    fn resolve(&self, selector: &PortSelector) -> Option<String>;
}

/// Resolves `Auto` by USB vendor/product id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceResolver {
    pub vid: u16,
    pub pid: u16,
}

impl UsbDeviceResolver {
    pub fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

impl Default for UsbDeviceResolver {
    /// STMicroelectronics virtual COM port.
    fn default() -> Self {
        Self::new(0x0483, 0x5740)
    }
}

impl DeviceResolver for UsbDeviceResolver {
    fn resolve(&self, selector: &PortSelector) -> Option<String> {
        match selector {
            PortSelector::Explicit(address) => Some(address.clone()),
            PortSelector::Auto => {
                let ports = match serialport::available_ports() {
                    Ok(ports) => ports,
                    Err(e) => {
                        warn!("failed to enumerate serial ports: {e}");
                        return None;
                    }
                };
                let mut candidates = ports.into_iter().filter(|port| {
                    matches!(&port.port_type, SerialPortType::UsbPort(usb)
                        if usb.vid == self.vid && usb.pid == self.pid)
                });
                let found = candidates.next()?;
                if candidates.next().is_some() {
                    warn!("more than one matching device, using {}", found.port_name);
                }
                Some(found.port_name)
            }
        }
    }
}

/// Retry loop that turns a selector into an open [`Session`].
pub struct DeviceLocator<'a> {
    resolver: &'a dyn DeviceResolver,
    opener: &'a dyn PortOpener,
    selector: PortSelector,
    port: PortConfiguration,
    retry_delay: Duration,
}

impl<'a> DeviceLocator<'a> {
    pub fn new(
        resolver: &'a dyn DeviceResolver,
        opener: &'a dyn PortOpener,
        selector: PortSelector,
        port: PortConfiguration,
    ) -> Self {
        Self {
            resolver,
            opener,
            selector,
            port,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Pause after each attempt (and before opening a freshly found device).
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Resolve and open the device, trying at most `max_attempts` times.
    pub fn acquire(&self, max_attempts: u32) -> HarnessResult<Session> {
        info!("Attempting to find device with {max_attempts} attempts.");

        for attempt in 0..max_attempts {
            debug!("Attempt to find device #{attempt}.");

            let Some(address) = self.resolver.resolve(&self.selector) else {
                std::thread::sleep(self.retry_delay);
                continue;
            };

            info!("Found device at {address}");
            // Freshly enumerated CDC devices drop the first bytes they get.
            std::thread::sleep(self.retry_delay);

            match Session::open(self.opener, &address, &self.port) {
                Ok(mut session) => {
                    if let Err(e) = session.clear_input() {
                        debug!("could not clear input buffer: {e}");
                    }
                    return Ok(session);
                }
                Err(e) => warn!("Failed to open {address}: {e}"),
            }
        }

        info!("Failed to find device ({})", self.selector);
        Err(HarnessError::DeviceNotFound {
            attempts: max_attempts,
        })
    }
}
