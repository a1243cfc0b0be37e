//! Event type definitions for the event bus.
//!
//! One variant per logically distinct change a poll cycle can observe.
//! Events are cloneable and serializable for logging/replay.

use serde::{Deserialize, Serialize};

use crate::data::{CashScope, EmptyLevel, FullLevel, MotorState, PaperState, PowerState, TouchKind};

/// Root event enum for all device events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// Power state of the connection changed.
    Power {
        /// New power state.
        state: PowerState,
    },
    /// Cash drawer opened or closed.
    Drawer {
        /// Whether the drawer is open now.
        open: bool,
    },
    /// Printer cover opened or closed.
    Cover {
        /// Whether the cover is open now.
        open: bool,
    },
    /// Receipt paper state changed.
    Paper {
        /// New paper state.
        state: PaperState,
    },
    /// A display unit went online or offline.
    Unit {
        /// Unit number, 1-based.
        unit: u8,
        /// Whether the unit is online now.
        online: bool,
    },
    /// Key pressed on a bump bar unit.
    Key {
        /// Unit number, 1-based.
        unit: u8,
        /// Key index, 0-based.
        key: u8,
    },
    /// Touch on an order display unit.
    Touch {
        /// Unit number, 1-based.
        unit: u8,
        /// Press or release.
        kind: TouchKind,
        /// Column, 0-based.
        column: u8,
        /// Row, 0-based.
        row: u8,
    },
    /// Clock data reported by a display unit.
    Clock {
        /// Unit number, 1-based.
        unit: u8,
        /// Displayed time, `None` when the clock stopped.
        time: Option<String>,
    },
    /// Belt state change.
    Belt(BeltEvent),
    /// Cash box state change.
    Cash(CashEvent),
}

impl DeviceEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            DeviceEvent::Power { .. } => EventCategory::Power,
            DeviceEvent::Drawer { .. } => EventCategory::Drawer,
            DeviceEvent::Cover { .. } | DeviceEvent::Paper { .. } => EventCategory::Printer,
            DeviceEvent::Unit { .. } | DeviceEvent::Clock { .. } => EventCategory::Unit,
            DeviceEvent::Key { .. } | DeviceEvent::Touch { .. } => EventCategory::Input,
            DeviceEvent::Belt(_) => EventCategory::Belt,
            DeviceEvent::Cash(_) => EventCategory::Cash,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            DeviceEvent::Power { state } => format!("Power: {}", state),
            DeviceEvent::Drawer { open } => {
                format!("Drawer {}", if *open { "opened" } else { "closed" })
            }
            DeviceEvent::Cover { open } => {
                format!("Cover {}", if *open { "opened" } else { "closed" })
            }
            DeviceEvent::Paper { state } => format!("Paper: {:?}", state),
            DeviceEvent::Unit { unit, online } => format!(
                "Unit {} {}",
                unit,
                if *online { "online" } else { "offline" }
            ),
            DeviceEvent::Key { unit, key } => format!("Unit {} key {}", unit, key),
            DeviceEvent::Touch {
                unit,
                kind,
                column,
                row,
            } => format!("Unit {} touch {:?} at {},{}", unit, kind, column, row),
            DeviceEvent::Clock { unit, time } => match time {
                Some(time) => format!("Unit {} clock {}", unit, time),
                None => format!("Unit {} clock stopped", unit),
            },
            DeviceEvent::Belt(e) => e.description(),
            DeviceEvent::Cash(e) => e.description(),
        }
    }
}

impl std::fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Power state transitions.
    Power,
    /// Cash drawer sensor.
    Drawer,
    /// Printer cover and paper sensors.
    Printer,
    /// Display unit status and clock data.
    Unit,
    /// Key and touch input.
    Input,
    /// Belt sensors and motor.
    Belt,
    /// Cash box sensors and deposits.
    Cash,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Power => write!(f, "Power"),
            EventCategory::Drawer => write!(f, "Drawer"),
            EventCategory::Printer => write!(f, "Printer"),
            EventCategory::Unit => write!(f, "Unit"),
            EventCategory::Input => write!(f, "Input"),
            EventCategory::Belt => write!(f, "Belt"),
            EventCategory::Cash => write!(f, "Cash"),
        }
    }
}

/// Belt events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeltEvent {
    /// Light barrier changed.
    LightBarrier {
        /// Whether the barrier is interrupted now.
        interrupted: bool,
    },
    /// Security flap changed.
    SecurityFlap {
        /// Whether the flap is open now.
        open: bool,
    },
    /// Motor health changed.
    Motor {
        /// New motor state.
        state: MotorState,
        /// Flap state at the time, distinguishes emergency from safety stops.
        flap_open: bool,
    },
    /// Belt stopped without a stop command.
    Stopped {
        /// Stopped by the light barrier rather than by a timeout.
        auto: bool,
    },
}

impl BeltEvent {
    fn description(&self) -> String {
        match self {
            BeltEvent::LightBarrier { interrupted } => format!(
                "Belt light barrier {}",
                if *interrupted { "interrupted" } else { "free" }
            ),
            BeltEvent::SecurityFlap { open } => {
                format!("Belt flap {}", if *open { "open" } else { "closed" })
            }
            BeltEvent::Motor { state, .. } => format!("Belt motor {:?}", state),
            BeltEvent::Stopped { auto } => {
                format!("Belt stopped ({})", if *auto { "auto" } else { "timeout" })
            }
        }
    }
}

/// Cash box events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashEvent {
    /// Full sensor changed.
    Full {
        /// Slots the sensor covers.
        scope: CashScope,
        /// New level.
        level: FullLevel,
    },
    /// Empty sensor changed.
    Empty {
        /// Slots the sensor covers.
        scope: CashScope,
        /// New level.
        level: EmptyLevel,
    },
    /// Jam raised or cleared.
    Jam {
        /// Whether the cash box is jammed now.
        jammed: bool,
    },
    /// Cash arrived during a deposit.
    Deposit {
        /// Slots counted for the deposit.
        scope: CashScope,
        /// Deposited amount so far.
        amount: i64,
        /// Deposited counts in `value:count` notation.
        counts: String,
    },
}

impl CashEvent {
    fn description(&self) -> String {
        match self {
            CashEvent::Full { scope, level } => format!("{:?} full sensor {:?}", scope, level),
            CashEvent::Empty { scope, level } => {
                format!("{:?} empty sensor {:?}", scope, level)
            }
            CashEvent::Jam { jammed } => {
                format!("Cash box {}", if *jammed { "jammed" } else { "jam cleared" })
            }
            CashEvent::Deposit { amount, .. } => format!("Deposit amount {}", amount),
        }
    }
}
