//! Cash drawer and printer categories of the printer connection

use super::{Cartridge, PrinterCommand, PrinterDialect, PrinterSnapshot};
use crate::engine::{CategoryStrategy, DeviceCategory, DeviceSession};
use possim_core::{DeviceError, DeviceEvent, PaperState, PowerState, Result};
use std::time::Duration;

/// Cash drawer session on a printer connection
pub type CashDrawer = DeviceSession<PrinterDialect, DrawerCategory>;

/// Printer session
pub type PosPrinter = DeviceSession<PrinterDialect, PrinterCategory>;

/// Cash drawer status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawerStatus {
    /// Connection power state
    pub power: PowerState,
    /// Drawer sensor
    pub open: bool,
}

/// Cash drawer category
#[derive(Debug, Default)]
pub struct DrawerCategory;

impl CategoryStrategy<PrinterDialect> for DrawerCategory {
    type Status = DrawerStatus;

    fn category(&self) -> DeviceCategory {
        DeviceCategory::CashDrawer
    }

    fn decode_status(&self, snapshot: &PrinterSnapshot) -> DrawerStatus {
        DrawerStatus {
            power: snapshot.power,
            open: snapshot.drawer_open,
        }
    }

    fn apply_status(&self, event: &DeviceEvent) -> Option<DeviceEvent> {
        match event {
            DeviceEvent::Power { .. } | DeviceEvent::Drawer { .. } => Some(event.clone()),
            _ => None,
        }
    }
}

impl DeviceSession<PrinterDialect, DrawerCategory> {
    /// Whether the drawer is open
    pub fn is_drawer_open(&self) -> bool {
        self.status().open
    }

    /// Open the drawer and wait until the controller reports it open.
    ///
    /// The command is sent even when the drawer is already open; the wait
    /// then succeeds right away.
    pub fn open_drawer(&self) -> Result<()> {
        self.ensure_claimed()?;
        if !self.power().is_reachable() {
            return Err(DeviceError::Offline.into());
        }
        let connection = self.connection();
        connection
            .channel()
            .send(&PrinterCommand::DrawerOpen.encode())
            .map_err(|e| self.command_failed(e.into()))?;
        connection.request_poll();
        connection.wait_for(connection.timing().response_bound(), |s| s.drawer_open)?;
        Ok(())
    }

    /// Block until the drawer is closed
    pub fn wait_for_drawer_close(&self, timeout: Duration) -> Result<()> {
        self.ensure_claimed()?;
        self.connection().wait_for(timeout, |s| !s.drawer_open)?;
        Ok(())
    }
}

/// Printer status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterStatus {
    /// Connection power state, `Fault` while the printer reports an error
    pub power: PowerState,
    /// Cover sensor
    pub cover_open: bool,
    /// Paper sensor
    pub paper: PaperState,
}

/// Printer category
#[derive(Debug, Default)]
pub struct PrinterCategory;

impl CategoryStrategy<PrinterDialect> for PrinterCategory {
    type Status = PrinterStatus;

    fn category(&self) -> DeviceCategory {
        DeviceCategory::PosPrinter
    }

    fn decode_status(&self, snapshot: &PrinterSnapshot) -> PrinterStatus {
        PrinterStatus {
            power: snapshot.power,
            cover_open: snapshot.cover_open,
            paper: snapshot.paper,
        }
    }

    fn apply_status(&self, event: &DeviceEvent) -> Option<DeviceEvent> {
        match event {
            DeviceEvent::Power { .. } | DeviceEvent::Cover { .. } | DeviceEvent::Paper { .. } => {
                Some(event.clone())
            }
            _ => None,
        }
    }
}

impl DeviceSession<PrinterDialect, PrinterCategory> {
    fn ensure_ready(&self) -> std::result::Result<(), DeviceError> {
        self.ensure_claimed()?;
        let status = self.status();
        match status.power {
            PowerState::Offline => Err(DeviceError::Offline),
            PowerState::Fault => Err(DeviceError::failure("printer reports an error")),
            PowerState::Online if status.cover_open => Err(DeviceError::illegal("cover open")),
            PowerState::Online if status.paper == PaperState::End => {
                Err(DeviceError::illegal("paper end"))
            }
            PowerState::Online => Ok(()),
        }
    }

    /// Reset print attributes and select the cartridge
    pub fn normalize(&self, cartridge: Cartridge) -> Result<()> {
        self.ensure_ready()?;
        self.connection()
            .channel()
            .send(&PrinterCommand::Normalize(cartridge).encode())
            .map_err(|e| self.command_failed(e.into()))
    }

    /// Pass pre-formatted print data to the printer
    pub fn transmit(&self, data: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        if data.is_empty() {
            return Ok(());
        }
        self.connection()
            .channel()
            .send(data)
            .map_err(|e| self.command_failed(e.into()))
    }
}
