//! # possim Core
//!
//! Core primitives shared by the possim crates:
//! the error taxonomy, wait gates, device state payloads and the
//! per-connection event bus.

pub mod data;
pub mod error;
pub mod event_bus;
pub mod wait;

pub use data::{
    BeltSpeed, BeltState, CashOperation, CashScope, CashSlot, CashState, EmptyLevel, FullLevel,
    MotorState, PaperState, PowerState, SlotTable, TouchKind, BILL_INDEX, SLOT_VALUES,
};

pub use error::{DeviceError, Error, ProtocolError, Result, TransportError};

pub use event_bus::{
    BeltEvent, CashEvent, DeviceEvent, EventBus, EventBusConfig, EventCategory, EventFilter,
    SubscriptionId,
};

pub use wait::{WaitGate, WaitList, Waiter};
