//! Bump bar and remote order display categories of the subsystem connection

use super::{unit_command, SubsystemDialect, SubsystemSnapshot, MAX_UNITS};
use crate::engine::{CategoryStrategy, Connection, DeviceCategory, DeviceSession};
use possim_core::{DeviceError, DeviceEvent, PowerState, Result};
use std::time::{Duration, Instant};

/// Bump bar session
pub type BumpBar = DeviceSession<SubsystemDialect, BumpBarCategory>;

/// Remote order display session
pub type RemoteOrderDisplay = DeviceSession<SubsystemDialect, OrderDisplayCategory>;

const STOP_CLOCK: &str = "ST000000";

/// Both categories need the controller connection up before a claim succeeds
fn await_controller(connection: &Connection<SubsystemDialect>, timeout: Duration) -> Result<()> {
    let timeout = timeout.max(connection.timing().min_claim_timeout);
    let deadline = Instant::now() + timeout;
    while !connection.power().is_online() {
        let now = Instant::now();
        if now >= deadline {
            tracing::debug!("{}: controller not connected within {:?}", connection.target(), timeout);
            return Err(DeviceError::Offline.into());
        }
        connection.await_cycle(deadline - now);
    }
    Ok(())
}

/// Bump bar status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpBarStatus {
    /// Controller connection state
    pub power: PowerState,
    /// Online units, bit `unit - 1`
    pub units_online: u8,
}

/// Bump bar category
#[derive(Debug, Default)]
pub struct BumpBarCategory;

impl CategoryStrategy<SubsystemDialect> for BumpBarCategory {
    type Status = BumpBarStatus;

    fn category(&self) -> DeviceCategory {
        DeviceCategory::BumpBar
    }

    fn on_claim(&self, connection: &Connection<SubsystemDialect>, timeout: Duration) -> Result<()> {
        await_controller(connection, timeout)
    }

    fn decode_status(&self, snapshot: &SubsystemSnapshot) -> BumpBarStatus {
        BumpBarStatus {
            power: snapshot.power,
            units_online: snapshot.units_online,
        }
    }

    fn apply_status(&self, event: &DeviceEvent) -> Option<DeviceEvent> {
        match event {
            DeviceEvent::Power { .. } | DeviceEvent::Unit { .. } | DeviceEvent::Key { .. } => {
                Some(event.clone())
            }
            _ => None,
        }
    }
}

/// Remote order display status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDisplayStatus {
    /// Controller connection state
    pub power: PowerState,
    /// Online units, bit `unit - 1`
    pub units_online: u8,
    /// Last clock per unit
    pub clocks: [Option<String>; MAX_UNITS as usize],
}

/// Remote order display category
#[derive(Debug, Default)]
pub struct OrderDisplayCategory;

impl CategoryStrategy<SubsystemDialect> for OrderDisplayCategory {
    type Status = OrderDisplayStatus;

    fn category(&self) -> DeviceCategory {
        DeviceCategory::RemoteOrderDisplay
    }

    fn on_claim(&self, connection: &Connection<SubsystemDialect>, timeout: Duration) -> Result<()> {
        await_controller(connection, timeout)
    }

    fn decode_status(&self, snapshot: &SubsystemSnapshot) -> OrderDisplayStatus {
        OrderDisplayStatus {
            power: snapshot.power,
            units_online: snapshot.units_online,
            clocks: snapshot.clocks.clone(),
        }
    }

    fn apply_status(&self, event: &DeviceEvent) -> Option<DeviceEvent> {
        match event {
            DeviceEvent::Power { .. }
            | DeviceEvent::Unit { .. }
            | DeviceEvent::Touch { .. }
            | DeviceEvent::Clock { .. } => Some(event.clone()),
            _ => None,
        }
    }
}

impl<S: CategoryStrategy<SubsystemDialect>> DeviceSession<SubsystemDialect, S> {
    /// Online units, bit `unit - 1`
    pub fn units_online(&self) -> u8 {
        self.connection().snapshot().units_online
    }

    /// Whether `unit` (1-based) is online
    pub fn is_unit_online(&self, unit: u8) -> bool {
        self.connection().snapshot().is_unit_online(unit)
    }

    /// Send `<uu><body>ETX` to a unit
    pub fn send_unit_command(&self, unit: u8, body: &str) -> Result<()> {
        self.ensure_online()?;
        if !(1..=MAX_UNITS).contains(&unit) {
            return Err(DeviceError::illegal(format!("no unit {}", unit)).into());
        }
        self.connection()
            .channel()
            .send(&unit_command(unit, body))
            .map_err(|e| self.command_failed(e.into()))
    }
}

impl DeviceSession<SubsystemDialect, OrderDisplayCategory> {
    /// Last clock reported by `unit`
    pub fn clock(&self, unit: u8) -> Option<String> {
        if !(1..=MAX_UNITS).contains(&unit) {
            return None;
        }
        self.connection().snapshot().clocks[usize::from(unit - 1)].clone()
    }

    /// Stop the clock of `unit` and return the time it reports.
    ///
    /// Waits up to the request timeout for the unit's next clock frame.
    pub fn stop_clock(&self, unit: u8) -> Result<Option<String>> {
        self.ensure_online()?;
        if !self.is_unit_online(unit) {
            return Err(DeviceError::illegal(format!("unit {} offline", unit)).into());
        }
        let index = usize::from(unit - 1);
        let connection = self.connection();
        let before = connection.snapshot().clock_updates[index];
        self.send_unit_command(unit, STOP_CLOCK)?;
        connection.request_poll();
        let snapshot = connection.wait_for(connection.timing().request_timeout, |s| {
            s.clock_updates[index] > before
        })?;
        Ok(snapshot.clocks[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::scripted::ScriptedDevice;
    use crate::engine::Timing;
    use std::sync::Arc;

    fn timing() -> Timing {
        Timing {
            poll_interval: Duration::from_millis(20),
            request_timeout: Duration::from_millis(300),
            character_timeout: Duration::from_millis(10),
            min_claim_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn connection(device: &ScriptedDevice) -> Arc<Connection<SubsystemDialect>> {
        Arc::new(Connection::new(SubsystemDialect::new(), device.factory(), timing()))
    }

    #[test]
    fn test_claim_fails_without_controller() {
        let device = ScriptedDevice::stream("kitchen");
        device.refuse_open(true);
        let bump_bar = BumpBar::new(connection(&device), BumpBarCategory);
        let err = bump_bar.claim(Some(Duration::from_millis(10))).unwrap_err();
        assert!(err.is_offline());
        assert_eq!(bump_bar.connection().open_count(), 0);
    }

    #[test]
    fn test_send_unit_command_frames_body() {
        let device = ScriptedDevice::stream("kitchen");
        let bump_bar = BumpBar::new(connection(&device), BumpBarCategory);
        bump_bar.claim(None).unwrap();
        bump_bar.send_unit_command(4, "X1").unwrap();
        assert!(device.writes().contains(&b"04X1\x03".to_vec()));
        assert!(bump_bar.send_unit_command(6, "X1").is_err());
    }

    #[test]
    fn test_stop_clock_returns_reported_time() {
        let device = ScriptedDevice::stream("kitchen");
        device.respond_with(|frame| (frame == b"02ST000000\x03").then(|| b"02T3:07\x03".to_vec()));
        let display = RemoteOrderDisplay::new(connection(&device), OrderDisplayCategory);
        display.claim(None).unwrap();

        device.push(b"02O1\x03".to_vec());
        display
            .connection()
            .wait_for(Duration::from_secs(1), |s| s.is_unit_online(2))
            .unwrap();
        assert_eq!(display.stop_clock(2).unwrap().as_deref(), Some("3:07"));
        assert_eq!(display.clock(2).as_deref(), Some("3:07"));
    }

    #[test]
    fn test_stop_clock_on_offline_unit_is_illegal() {
        let device = ScriptedDevice::stream("kitchen");
        let display = RemoteOrderDisplay::new(connection(&device), OrderDisplayCategory);
        display.claim(None).unwrap();
        let err = display.stop_clock(1).unwrap_err();
        assert!(matches!(err, possim_core::Error::Device(DeviceError::Illegal { .. })));
    }
}
