//! Kitchen subsystem controller (TCP)
//!
//! The controller pushes ETX-terminated frames for up to five display
//! units: unit state, bump bar keys, order display touches and clock
//! ticks. There is no request; each cycle reads whatever arrived within
//! the character timeout. The connection is online while the socket is
//! up, units are online per their last state frame.

pub mod frame;
pub mod session;

pub use frame::{unit_bit, unit_command, FrameSplitter, SubsystemFrame, ETX, MAX_UNITS};
pub use session::{
    BumpBar, BumpBarCategory, BumpBarStatus, OrderDisplayCategory, OrderDisplayStatus,
    RemoteOrderDisplay,
};

use crate::engine::{CommandChannel, Dialect, Snapshot};
use parking_lot::Mutex;
use possim_core::{DeviceEvent, PowerState, Result};

const READ_CHUNK: usize = 256;
const MAX_READS: usize = 16;

/// Published state of a subsystem connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsystemSnapshot {
    /// Online while the controller connection is up
    pub power: PowerState,
    /// Bit `unit - 1` set while the unit is online
    pub units_online: u8,
    /// Last clock per unit, `None` when stopped or never reported
    pub clocks: [Option<String>; MAX_UNITS as usize],
    /// Clock frames received per unit
    pub clock_updates: [u64; MAX_UNITS as usize],
}

impl SubsystemSnapshot {
    /// Whether `unit` (1-based) is online
    pub fn is_unit_online(&self, unit: u8) -> bool {
        (1..=MAX_UNITS).contains(&unit) && self.units_online & unit_bit(unit) != 0
    }

    fn apply(&mut self, frame: SubsystemFrame, inputs: &mut Vec<DeviceEvent>) {
        match frame {
            SubsystemFrame::State { unit, online } => {
                if online {
                    self.units_online |= unit_bit(unit);
                } else {
                    self.units_online &= !unit_bit(unit);
                }
            }
            SubsystemFrame::Key { unit, key } => {
                if self.is_unit_online(unit) {
                    inputs.push(DeviceEvent::Key { unit, key });
                } else {
                    tracing::debug!("key {} from offline unit {} dropped", key, unit);
                }
            }
            SubsystemFrame::Touch {
                unit,
                kind,
                column,
                row,
            } => {
                if self.is_unit_online(unit) {
                    inputs.push(DeviceEvent::Touch {
                        unit,
                        kind,
                        column,
                        row,
                    });
                } else {
                    tracing::debug!("touch at {},{} from offline unit {} dropped", column, row, unit);
                }
            }
            SubsystemFrame::Clock { unit, time } => {
                let index = usize::from(unit - 1);
                self.clocks[index] = time;
                self.clock_updates[index] += 1;
            }
        }
    }
}

impl Snapshot for SubsystemSnapshot {
    fn power(&self) -> PowerState {
        self.power
    }

    fn set_power(&mut self, power: PowerState) {
        self.power = power;
    }
}

/// Frame reader for the subsystem controller
#[derive(Debug, Default)]
pub struct SubsystemDialect {
    splitter: Mutex<FrameSplitter>,
}

impl SubsystemDialect {
    /// Create the dialect
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dialect for SubsystemDialect {
    type Snapshot = SubsystemSnapshot;

    fn name(&self) -> &'static str {
        "subsystem"
    }

    fn poll(
        &self,
        channel: &CommandChannel,
        next: &mut SubsystemSnapshot,
        inputs: &mut Vec<DeviceEvent>,
    ) -> Result<()> {
        let data = channel.exchange(|transport, timing| {
            transport.set_timeout(timing.character_timeout)?;
            let mut data = transport.read(READ_CHUNK)?;
            for _ in 0..MAX_READS {
                if data.is_empty() || transport.available()? == 0 {
                    break;
                }
                data.extend(transport.read(READ_CHUNK)?);
            }
            Ok(data)
        })?;
        next.power = PowerState::Online;

        let frames = self.splitter.lock().push(&data)?;
        for frame in frames {
            next.apply(SubsystemFrame::decode(&frame)?, inputs);
        }
        Ok(())
    }

    fn diff(
        &self,
        previous: &SubsystemSnapshot,
        current: &SubsystemSnapshot,
        events: &mut Vec<DeviceEvent>,
    ) {
        for unit in 1..=MAX_UNITS {
            let online = current.is_unit_online(unit);
            if previous.is_unit_online(unit) != online {
                events.push(DeviceEvent::Unit { unit, online });
            }
        }
        for unit in 1..=MAX_UNITS {
            let index = usize::from(unit - 1);
            if previous.clocks[index] != current.clocks[index] {
                events.push(DeviceEvent::Clock {
                    unit,
                    time: current.clocks[index].clone(),
                });
            }
        }
    }

    fn on_offline(&self, snapshot: &mut SubsystemSnapshot) {
        snapshot.units_online = 0;
        self.splitter.lock().clear();
    }
}
