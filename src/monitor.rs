//! Device monitor
//!
//! Builds one session per configured device. Devices on the same
//! controller share a pooled connection, so a printer and its cash
//! drawer run a single poller.

use possim_communication::dialect::printer::{DrawerCategory, PrinterCategory};
use possim_communication::dialect::subsystem::{BumpBarCategory, OrderDisplayCategory};
use possim_communication::dialect::udp::{BeltCategory, UdpDrawerCategory};
use possim_communication::{
    Belt, BumpBar, CashCategory, CashDevice, CashDrawer, ConnectionPool, DeviceCategory,
    PosPrinter, PrinterDialect, RemoteOrderDisplay, SubsystemDialect, UdpCashDrawer, UdpDialect,
};
use possim_core::{EventBus, EventFilter, PowerState, Result, SubscriptionId};
use possim_settings::{Config, ConfigError, ConfigResult, DeviceSettings, DialectKind};
use std::time::Duration;

enum Session {
    CashDrawer(CashDrawer),
    PosPrinter(PosPrinter),
    BumpBar(BumpBar),
    OrderDisplay(RemoteOrderDisplay),
    UdpCashDrawer(UdpCashDrawer),
    Belt(Belt),
    Cash(CashDevice),
}

macro_rules! each_session {
    ($session:expr, $s:ident => $body:expr) => {
        match $session {
            Session::CashDrawer($s) => $body,
            Session::PosPrinter($s) => $body,
            Session::BumpBar($s) => $body,
            Session::OrderDisplay($s) => $body,
            Session::UdpCashDrawer($s) => $body,
            Session::Belt($s) => $body,
            Session::Cash($s) => $body,
        }
    };
}

/// A configured device and its session
pub struct MonitoredDevice {
    name: String,
    session: Session,
}

impl MonitoredDevice {
    /// Configured name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device category
    pub fn category(&self) -> DeviceCategory {
        each_session!(&self.session, s => s.category())
    }

    /// Connection power state
    pub fn power(&self) -> PowerState {
        each_session!(&self.session, s => s.power())
    }

    /// Whether the device is claimed
    pub fn is_claimed(&self) -> bool {
        each_session!(&self.session, s => s.is_claimed())
    }

    /// Claim the device
    pub fn claim(&self, timeout: Option<Duration>) -> Result<()> {
        each_session!(&self.session, s => s.claim(timeout))
    }

    /// Release the device
    pub fn release(&self) {
        each_session!(&self.session, s => s.release())
    }

    /// Events of the device
    pub fn events(&self) -> &EventBus {
        each_session!(&self.session, s => s.events())
    }

    /// Target of the device's connection
    pub fn target(&self) -> &str {
        each_session!(&self.session, s => s.connection().target())
    }

    /// Cash drawer session, if the device is one
    pub fn as_cash_drawer(&self) -> Option<&CashDrawer> {
        match &self.session {
            Session::CashDrawer(s) => Some(s),
            _ => None,
        }
    }

    /// Cash box session, if the device is an acceptor, dispenser or changer
    pub fn as_cash_device(&self) -> Option<&CashDevice> {
        match &self.session {
            Session::Cash(s) => Some(s),
            _ => None,
        }
    }
}

/// Sessions for every configured device
pub struct Monitor {
    printers: ConnectionPool<PrinterDialect>,
    kitchen: ConnectionPool<SubsystemDialect>,
    udp: ConnectionPool<UdpDialect>,
    devices: Vec<MonitoredDevice>,
}

impl Monitor {
    /// Build sessions for a validated configuration
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        config.validate()?;
        let mut monitor = Self {
            printers: ConnectionPool::new(),
            kitchen: ConnectionPool::new(),
            udp: ConnectionPool::new(),
            devices: Vec::with_capacity(config.devices.len()),
        };
        for settings in &config.devices {
            let session = monitor.session_for(settings)?;
            tracing::debug!(
                "Device {} ({}) on {}",
                settings.name,
                settings.category,
                settings.port
            );
            monitor.devices.push(MonitoredDevice {
                name: settings.name.clone(),
                session,
            });
        }
        Ok(monitor)
    }

    fn session_for(&self, settings: &DeviceSettings) -> ConfigResult<Session> {
        let params = settings.connection_params();
        let timing = settings.timing();
        let notify = settings.power_notify;

        let session = match (settings.dialect, settings.category) {
            (DialectKind::Printer, DeviceCategory::CashDrawer) => {
                let connection = self.printers.connect(&params, timing, PrinterDialect::new);
                Session::CashDrawer(CashDrawer::new(connection, DrawerCategory).with_power_notify(notify))
            }
            (DialectKind::Printer, DeviceCategory::PosPrinter) => {
                let connection = self.printers.connect(&params, timing, PrinterDialect::new);
                Session::PosPrinter(PosPrinter::new(connection, PrinterCategory).with_power_notify(notify))
            }
            (DialectKind::Subsystem, DeviceCategory::BumpBar) => {
                let connection = self.kitchen.connect(&params, timing, SubsystemDialect::new);
                Session::BumpBar(BumpBar::new(connection, BumpBarCategory).with_power_notify(notify))
            }
            (DialectKind::Subsystem, DeviceCategory::RemoteOrderDisplay) => {
                let connection = self.kitchen.connect(&params, timing, SubsystemDialect::new);
                Session::OrderDisplay(
                    RemoteOrderDisplay::new(connection, OrderDisplayCategory).with_power_notify(notify),
                )
            }
            (DialectKind::Udp, DeviceCategory::CashDrawer) => {
                let connection = self.udp.connect(&params, timing, UdpDialect::new);
                Session::UdpCashDrawer(UdpCashDrawer::new(connection, UdpDrawerCategory).with_power_notify(notify))
            }
            (DialectKind::Udp, DeviceCategory::Belt) => {
                let connection = self.udp.connect(&params, timing, UdpDialect::new);
                Session::Belt(Belt::new(connection, BeltCategory).with_power_notify(notify))
            }
            (DialectKind::Udp, category) => {
                let strategy = match category {
                    DeviceCategory::BillAcceptor => CashCategory::bill_acceptor(),
                    DeviceCategory::CoinAcceptor => CashCategory::coin_acceptor(),
                    DeviceCategory::CashChanger => CashCategory::cash_changer(),
                    DeviceCategory::BillDispenser => CashCategory::bill_dispenser(),
                    DeviceCategory::CoinDispenser => CashCategory::coin_dispenser(),
                    _ => return Err(unsupported(settings)),
                };
                let connection = self.udp.connect(&params, timing, UdpDialect::new);
                Session::Cash(CashDevice::new(connection, strategy).with_power_notify(notify))
            }
            _ => return Err(unsupported(settings)),
        };
        Ok(session)
    }

    /// Configured devices in configuration order
    pub fn devices(&self) -> &[MonitoredDevice] {
        &self.devices
    }

    /// Device named `name`
    pub fn device(&self, name: &str) -> Option<&MonitoredDevice> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Number of distinct controller connections
    pub fn connection_count(&self) -> usize {
        self.printers.len() + self.kitchen.len() + self.udp.len()
    }

    /// Log every event of every device
    pub fn log_events(&self) -> Vec<SubscriptionId> {
        self.devices
            .iter()
            .map(|device| {
                let name = device.name.clone();
                device.events().subscribe(EventFilter::All, move |event| {
                    tracing::info!(device = %name, category = ?event.category(), "{}", event);
                })
            })
            .collect()
    }

    /// Claim every device, returning the ones that failed
    pub fn claim_all(&self, timeout: Option<Duration>) -> Vec<(String, possim_core::Error)> {
        let mut failed = Vec::new();
        for device in &self.devices {
            match device.claim(timeout) {
                Ok(()) => tracing::info!(
                    "Claimed {} ({}), power {:?}",
                    device.name,
                    device.category(),
                    device.power()
                ),
                Err(e) => {
                    tracing::warn!("Failed to claim {}: {}", device.name, e);
                    failed.push((device.name.clone(), e));
                }
            }
        }
        failed
    }

    /// Release every claimed device
    pub fn release_all(&self) {
        for device in self.devices.iter().filter(|d| d.is_claimed()) {
            device.release();
            tracing::debug!("Released {}", device.name);
        }
    }
}

fn unsupported(settings: &DeviceSettings) -> ConfigError {
    ConfigError::Unsupported {
        device: settings.name.clone(),
        what: format!("the {} dialect", settings.dialect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use possim_core::DeviceEvent;
    use possim_settings::SettingsPersistence;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tempfile::TempDir;

    fn config() -> Config {
        let mut config = Config::new();
        for (name, category) in [
            ("drawer", DeviceCategory::CashDrawer),
            ("belt", DeviceCategory::Belt),
            ("bills", DeviceCategory::BillAcceptor),
            ("coins", DeviceCategory::CoinDispenser),
        ] {
            config.upsert_device(DeviceSettings::new(
                name,
                category,
                DialectKind::Udp,
                "127.0.0.1:45999",
            ));
        }
        config.upsert_device(DeviceSettings::new(
            "bar",
            DeviceCategory::BumpBar,
            DialectKind::Subsystem,
            "127.0.0.1:45998",
        ));
        config
    }

    #[test]
    fn test_devices_share_controller_connections() {
        let monitor = Monitor::from_config(&config()).unwrap();
        assert_eq!(monitor.devices().len(), 5);
        assert_eq!(monitor.connection_count(), 2);

        let drawer = monitor.device("drawer").unwrap();
        assert_eq!(drawer.category(), DeviceCategory::CashDrawer);
        assert!(drawer.as_cash_drawer().is_none());
        assert_eq!(drawer.target(), monitor.device("bills").unwrap().target());
        assert!(monitor.device("coins").unwrap().as_cash_device().is_some());
        assert!(!drawer.is_claimed());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.upsert_device(DeviceSettings::new(
            "printer",
            DeviceCategory::PosPrinter,
            DialectKind::Udp,
            "127.0.0.1:45999",
        ));
        assert!(matches!(
            Monitor::from_config(&config),
            Err(ConfigError::Unsupported { .. })
        ));
    }

    /// Printer controller answering ESC s with the drawer bit
    fn spawn_printer() -> (String, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut drawer_open = false;
            let mut buffer = [0u8; 64];
            loop {
                let read = match stream.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => read,
                };
                for pair in buffer[..read].windows(2) {
                    match pair {
                        [0x1b, b'd'] => drawer_open = true,
                        [0x1b, b's'] => {
                            let status = if drawer_open { b'1' } else { b'0' };
                            if stream.write_all(&[status]).is_err() {
                                return;
                            }
                        }
                        _ => {}
                    }
                }
            }
        });
        (address, server)
    }

    #[test]
    fn test_monitor_claims_configured_printer() {
        let (address, server) = spawn_printer();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                r#"
                    [[devices]]
                    name = "drawer"
                    category = "CashDrawer"
                    dialect = "printer"
                    transport = "tcp"
                    port = "{address}"
                    poll_interval_ms = 50

                    [[devices]]
                    name = "receipt"
                    category = "PosPrinter"
                    dialect = "printer"
                    transport = "tcp"
                    port = "{address}"
                    poll_interval_ms = 50
                "#
            ),
        )
        .unwrap();

        let settings = SettingsPersistence::load_from_file(&path).unwrap();
        let monitor = Monitor::from_config(settings.config()).unwrap();
        assert_eq!(monitor.connection_count(), 1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let drawer = monitor.device("drawer").unwrap();
        drawer
            .events()
            .subscribe(EventFilter::All, move |event| sink.lock().unwrap().push(event.clone()));

        assert!(monitor.claim_all(None).is_empty());
        assert!(monitor.devices().iter().all(|d| d.power() == PowerState::Online));

        let session = drawer.as_cash_drawer().unwrap();
        session.open_drawer().unwrap();
        assert!(session.is_drawer_open());
        let deadline = Instant::now() + Duration::from_secs(1);
        while !seen.lock().unwrap().contains(&DeviceEvent::Drawer { open: true }) {
            assert!(Instant::now() < deadline, "no drawer event");
            std::thread::sleep(Duration::from_millis(5));
        }

        monitor.release_all();
        assert!(monitor.devices().iter().all(|d| !d.is_claimed()));
        drop(monitor);
        server.join().unwrap();
    }
}
