//! Device state payloads
//!
//! Plain state types shared by the dialect snapshots and the events the
//! notifier raises. Wire encodings live with the dialects.

mod belt;
mod cash;

pub use belt::{BeltState, BeltSpeed, MotorState};
pub use cash::{
    CashOperation, CashScope, CashSlot, CashState, EmptyLevel, FullLevel, SlotTable,
    BILL_INDEX, SLOT_VALUES,
};

use serde::{Deserialize, Serialize};

/// Power state of a connection as seen by its sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PowerState {
    /// Device answers and reports no error
    Online,
    /// Device answers but reports an error condition
    Fault,
    /// No communication with the device
    #[default]
    Offline,
}

impl PowerState {
    /// Device answers and is usable
    pub fn is_online(self) -> bool {
        self == PowerState::Online
    }

    /// Device answers at all
    pub fn is_reachable(self) -> bool {
        self != PowerState::Offline
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Online => write!(f, "online"),
            PowerState::Fault => write!(f, "fault"),
            PowerState::Offline => write!(f, "offline"),
        }
    }
}

/// Receipt paper sensor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaperState {
    /// Paper present
    #[default]
    Ok,
    /// Paper running low
    NearEnd,
    /// Out of paper
    End,
}

/// Touch direction reported by an order display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TouchKind {
    /// Finger lifted
    Up,
    /// Finger pressed
    Down,
}
