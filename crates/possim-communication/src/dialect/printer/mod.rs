//! Receipt printer with attached cash drawer (serial or TCP)
//!
//! Each cycle sends `ESC s` and reads a single status byte, retrying up
//! to `max_retry` times with the request timeout. The byte carries the
//! drawer sensor and the printer state, see [`status_parser`].

pub mod command_creator;
pub mod session;
pub mod status_parser;

pub use command_creator::{Cartridge, PrinterCommand};
pub use session::{CashDrawer, DrawerCategory, DrawerStatus, PosPrinter, PrinterCategory, PrinterStatus};
pub use status_parser::{PrinterState, StatusByte};

use crate::engine::{CommandChannel, Dialect, Snapshot};
use possim_core::{DeviceEvent, PaperState, PowerState, ProtocolError, Result};

/// Published state of a printer connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrinterSnapshot {
    /// Communication state, `Fault` while the printer reports an error
    pub power: PowerState,
    /// Drawer sensor
    pub drawer_open: bool,
    /// Cover sensor
    pub cover_open: bool,
    /// Paper sensor
    pub paper: PaperState,
}

impl Snapshot for PrinterSnapshot {
    fn power(&self) -> PowerState {
        self.power
    }

    fn set_power(&mut self, power: PowerState) {
        self.power = power;
    }
}

/// Status polling for the printer controller
#[derive(Debug, Default)]
pub struct PrinterDialect;

impl PrinterDialect {
    /// Create the dialect
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PrinterDialect {
    type Snapshot = PrinterSnapshot;

    fn name(&self) -> &'static str {
        "printer"
    }

    fn poll(
        &self,
        channel: &CommandChannel,
        next: &mut PrinterSnapshot,
        _inputs: &mut Vec<DeviceEvent>,
    ) -> Result<()> {
        let request = PrinterCommand::StatusRequest.encode();
        let value = channel.exchange(|transport, timing| {
            transport.flush()?;
            for attempt in 1..=timing.attempts() {
                transport.write(&request)?;
                transport.set_timeout(timing.request_timeout)?;
                let data = transport.read(16)?;
                if let Some(&last) = data.last() {
                    return Ok(last);
                }
                tracing::trace!("{}: no status byte, attempt {}", channel.target(), attempt);
            }
            Err(ProtocolError::NoResponse {
                attempts: timing.attempts(),
            }
            .into())
        })?;
        StatusByte::decode(value)?.apply(next);
        Ok(())
    }

    fn diff(&self, previous: &PrinterSnapshot, current: &PrinterSnapshot, events: &mut Vec<DeviceEvent>) {
        if previous.drawer_open != current.drawer_open {
            events.push(DeviceEvent::Drawer {
                open: current.drawer_open,
            });
        }
        if previous.cover_open != current.cover_open {
            events.push(DeviceEvent::Cover {
                open: current.cover_open,
            });
        }
        if previous.paper != current.paper {
            events.push(DeviceEvent::Paper {
                state: current.paper,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::scripted::ScriptedDevice;
    use crate::engine::Timing;
    use possim_core::WaitGate;
    use std::sync::Arc;
    use std::time::Duration;

    fn channel(device: &ScriptedDevice) -> CommandChannel {
        let timing = Timing {
            request_timeout: Duration::from_millis(30),
            max_retry: 2,
            ..Default::default()
        };
        CommandChannel::new(device.factory(), timing, Arc::new(WaitGate::new()))
    }

    #[test]
    fn test_poll_decodes_status() {
        let device = ScriptedDevice::stream("sim");
        device.respond_with(|frame| (frame == b"\x1bs").then(|| b"3".to_vec()));
        let channel = channel(&device);

        let mut next = PrinterSnapshot::default();
        PrinterDialect.poll(&channel, &mut next, &mut Vec::new()).unwrap();
        assert_eq!(next.power, PowerState::Online);
        assert!(next.drawer_open);
        assert_eq!(next.paper, PaperState::NearEnd);
    }

    #[test]
    fn test_poll_retries_once_then_fails() {
        let device = ScriptedDevice::stream("sim");
        device.set_silent(true);
        let channel = channel(&device);

        let result = PrinterDialect.poll(&channel, &mut PrinterSnapshot::default(), &mut Vec::new());
        assert!(result.unwrap_err().is_protocol_error());
        assert_eq!(device.writes().len(), 2);
        assert!(!channel.is_open());
    }

    #[test]
    fn test_poll_rejects_garbage() {
        let device = ScriptedDevice::stream("sim");
        device.respond_with(|_| Some(b"X".to_vec()));
        let channel = channel(&device);

        let result = PrinterDialect.poll(&channel, &mut PrinterSnapshot::default(), &mut Vec::new());
        assert!(result.unwrap_err().is_protocol_error());
    }

    #[test]
    fn test_diff_reports_each_sensor() {
        let previous = PrinterSnapshot {
            power: PowerState::Online,
            ..Default::default()
        };
        let current = PrinterSnapshot {
            power: PowerState::Online,
            drawer_open: true,
            cover_open: true,
            paper: PaperState::End,
        };
        let mut events = Vec::new();
        PrinterDialect.diff(&previous, &current, &mut events);
        assert_eq!(
            events,
            vec![
                DeviceEvent::Drawer { open: true },
                DeviceEvent::Cover { open: true },
                DeviceEvent::Paper {
                    state: PaperState::End
                },
            ]
        );
    }
}
