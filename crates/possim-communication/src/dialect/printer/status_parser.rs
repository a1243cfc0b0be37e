//! Printer status byte
//!
//! Layout of the single status byte the controller returns:
//!
//! | bits | meaning |
//! |------|---------|
//! | 0    | drawer open |
//! | rest | printer state: `'0'` ok, `'2'` paper near end, `'4'` paper end, `'6'` cover open, `'8'` error |

use super::PrinterSnapshot;
use possim_core::{PaperState, PowerState, ProtocolError};

/// Drawer bit of the status byte
pub const DRAWER_BIT: u8 = 1;

/// Printer part of the status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrinterState {
    /// Ready, paper present
    Ok,
    /// Paper near end
    NearEnd,
    /// Paper end
    End,
    /// Cover open
    CoverOpen,
    /// Printer error
    Error,
}

impl PrinterState {
    fn as_byte(self) -> u8 {
        match self {
            PrinterState::Ok => b'0',
            PrinterState::NearEnd => b'2',
            PrinterState::End => b'4',
            PrinterState::CoverOpen => b'6',
            PrinterState::Error => b'8',
        }
    }
}

/// Decoded status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusByte {
    /// Printer state
    pub printer: PrinterState,
    /// Drawer sensor
    pub drawer_open: bool,
}

impl StatusByte {
    /// Decode one status byte
    pub fn decode(value: u8) -> Result<Self, ProtocolError> {
        let drawer_open = value & DRAWER_BIT != 0;
        let printer = match value & !DRAWER_BIT {
            b'0' => PrinterState::Ok,
            b'2' => PrinterState::NearEnd,
            b'4' => PrinterState::End,
            b'6' => PrinterState::CoverOpen,
            b'8' => PrinterState::Error,
            _ => {
                return Err(ProtocolError::InvalidValue {
                    field: "printer status",
                    value: format!("0x{:02X}", value),
                })
            }
        };
        Ok(Self {
            printer,
            drawer_open,
        })
    }

    /// Status byte as the controller sends it
    pub fn encode(&self) -> u8 {
        self.printer.as_byte() | if self.drawer_open { DRAWER_BIT } else { 0 }
    }

    /// Apply to a snapshot. An error keeps the last cover and paper state.
    pub fn apply(&self, snapshot: &mut PrinterSnapshot) {
        snapshot.drawer_open = self.drawer_open;
        let (cover_open, paper) = match self.printer {
            PrinterState::Error => {
                snapshot.power = PowerState::Fault;
                return;
            }
            PrinterState::Ok => (false, PaperState::Ok),
            PrinterState::NearEnd => (false, PaperState::NearEnd),
            PrinterState::End => (false, PaperState::End),
            PrinterState::CoverOpen => (true, PaperState::End),
        };
        snapshot.power = PowerState::Online;
        snapshot.cover_open = cover_open;
        snapshot.paper = paper;
    }
}
