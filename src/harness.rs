//! Top-level orchestration of the two CLI commands.

use crate::config::Config;
use crate::device::{DeviceLocator, DeviceResolver};
use crate::error::HarnessResult;
use crate::monitor::StreamMonitor;
use crate::port::{PortOpener, Session};
use crate::report::{self, TestReport};
use tracing::{error, info, warn};

/// Runs the device commands against a resolver and a port opener.
pub struct Harness<'a> {
    config: &'a Config,
    resolver: &'a dyn DeviceResolver,
    opener: &'a dyn PortOpener,
}

impl<'a> Harness<'a> {
    pub fn new(
        config: &'a Config,
        resolver: &'a dyn DeviceResolver,
        opener: &'a dyn PortOpener,
    ) -> Self {
        Self {
            config,
            resolver,
            opener,
        }
    }

    fn locator(&self) -> DeviceLocator<'a> {
        let device = &self.config.device;
        DeviceLocator::new(
            self.resolver,
            self.opener,
            device.selector(),
            device.port_configuration(),
        )
        .retry_delay(device.retry_delay())
    }

    /// Wait until the device can be opened, then release it.
    pub fn await_device(&self, attempts: u32) -> HarnessResult<()> {
        let mut session = self.locator().acquire(attempts)?;
        info!("Device started at {}", session.name());
        close_session(&mut session);
        Ok(())
    }

    /// Trigger the on-device unit tests and collect the report.
    ///
    /// Both sessions are closed before this returns, whatever the outcome.
    pub fn run_units(&self) -> HarnessResult<TestReport> {
        let mut session = self.locator().acquire(self.config.device.run_attempts)?;

        let mut monitor = match self.config.monitor.monitor_config() {
            Some(monitor_config) => {
                let mut monitor = StreamMonitor::new(monitor_config);
                if let Err(e) = monitor.start(self.opener) {
                    error!("Failed to start secondary monitoring: {e}");
                    close_session(&mut session);
                    return Err(e);
                }
                info!("Started monitoring secondary port: {}", monitor.address());
                Some(monitor)
            }
            None => None,
        };

        let outcome = report::run(&mut session, &self.config.device.run_options());

        if let Some(monitor) = monitor.as_mut() {
            monitor.stop();
        }
        close_session(&mut session);

        let report = outcome?;
        Ok(match monitor {
            Some(monitor) => report.with_secondary_transcript(monitor.collected_output()),
            None => report,
        })
    }
}

fn close_session(session: &mut Session) {
    if let Err(e) = session.close() {
        warn!("Error closing {}: {e}", session.name());
    }
}
