//! Device configuration for possim
//!
//! A [`Config`] lists the simulated controllers to connect to. Each
//! [`DeviceSettings`] names one device category on one dialect; timing
//! keys left out fall back to the [`DialectDefaults`] of its dialect.
//! Files are TOML or JSON, chosen by extension.
//!
//! ```toml
//! [[devices]]
//! name = "drawer"
//! category = "CashDrawer"
//! dialect = "printer"
//! port = "/dev/ttyUSB0"
//!
//! [[devices]]
//! name = "bills"
//! category = "BillAcceptor"
//! dialect = "udp"
//! port = "127.0.0.1:45000"
//! request_timeout_ms = 800
//! ```

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
use possim_communication::{
    ConnectionParams, DeviceCategory, LoggingMode, SerialParity, Timing, TransportKind,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Controller protocol a device talks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// Printer with cash drawer, serial or TCP
    Printer,
    /// Kitchen subsystem controller over TCP
    Subsystem,
    /// Drawer, belt and cash box controller over UDP
    Udp,
}

impl DialectKind {
    /// Whether devices of `category` run on this dialect
    pub fn supports(self, category: DeviceCategory) -> bool {
        use DeviceCategory::*;
        match self {
            DialectKind::Printer => matches!(category, CashDrawer | PosPrinter),
            DialectKind::Subsystem => matches!(category, BumpBar | RemoteOrderDisplay),
            DialectKind::Udp => matches!(
                category,
                CashDrawer
                    | Belt
                    | BillAcceptor
                    | BillDispenser
                    | CashChanger
                    | CoinAcceptor
                    | CoinDispenser
            ),
        }
    }

    /// Transports the dialect runs over, default first
    pub fn transports(self) -> &'static [TransportKind] {
        match self {
            DialectKind::Printer => &[TransportKind::Serial, TransportKind::Tcp],
            DialectKind::Subsystem => &[TransportKind::Tcp],
            DialectKind::Udp => &[TransportKind::Udp],
        }
    }

    /// Timing defaults of the dialect
    pub fn defaults(self) -> DialectDefaults {
        DialectDefaults::for_dialect(self)
    }
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Printer => write!(f, "printer"),
            Self::Subsystem => write!(f, "subsystem"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Timing a dialect uses when the configuration leaves it out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectDefaults {
    /// Pause between poll cycles in milliseconds
    pub poll_interval_ms: u64,
    /// Budget of one request attempt in milliseconds
    pub request_timeout_ms: u64,
    /// Attempts per request
    pub max_retry: u32,
    /// Read timeout of push dialects in milliseconds
    pub character_timeout_ms: u64,
    /// Lower bound of a claim's wait in milliseconds
    pub min_claim_timeout_ms: u64,
}

impl DialectDefaults {
    /// Defaults of `dialect`
    pub fn for_dialect(dialect: DialectKind) -> Self {
        match dialect {
            DialectKind::Printer => Self {
                poll_interval_ms: 1000,
                request_timeout_ms: 500,
                max_retry: 2,
                character_timeout_ms: 50,
                min_claim_timeout_ms: 100,
            },
            DialectKind::Subsystem => Self {
                poll_interval_ms: 100,
                request_timeout_ms: 1000,
                max_retry: 1,
                character_timeout_ms: 50,
                min_claim_timeout_ms: 100,
            },
            DialectKind::Udp => Self {
                poll_interval_ms: 200,
                request_timeout_ms: 500,
                max_retry: 2,
                character_timeout_ms: 50,
                min_claim_timeout_ms: 100,
            },
        }
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    2
}

/// One configured device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Unique device name
    pub name: String,
    /// Device category
    pub category: DeviceCategory,
    /// Controller protocol
    pub dialect: DialectKind,
    /// Serial port name or `host:port`
    pub port: String,
    /// Transport, the dialect's default when left out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    /// Local socket port, 0 lets the OS choose
    #[serde(default)]
    pub own_port: u16,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Serial data bits
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Serial stop bits
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Serial parity
    #[serde(default)]
    pub parity: SerialParity,
    /// I/O trace format
    #[serde(default)]
    pub logging: LoggingMode,
    /// Claim even while offline and report power changes
    #[serde(default)]
    pub power_notify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_claim_timeout_ms: Option<u64>,
    /// Pause before every command write, for tests
    #[serde(default)]
    pub command_delay_ms: u64,
}

impl DeviceSettings {
    /// Device with the dialect's defaults
    pub fn new(
        name: impl Into<String>,
        category: DeviceCategory,
        dialect: DialectKind,
        port: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            dialect,
            port: port.into(),
            transport: None,
            own_port: 0,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: SerialParity::None,
            logging: LoggingMode::default(),
            power_notify: false,
            poll_interval_ms: None,
            request_timeout_ms: None,
            max_retry: None,
            character_timeout_ms: None,
            min_claim_timeout_ms: None,
            command_delay_ms: 0,
        }
    }

    /// Use `transport` instead of the dialect's default
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Transport in effect
    pub fn transport_kind(&self) -> TransportKind {
        self.transport
            .unwrap_or_else(|| self.dialect.transports()[0])
    }

    /// Timing with dialect defaults filled in
    pub fn timing(&self) -> Timing {
        let defaults = self.dialect.defaults();
        Timing {
            poll_interval: Duration::from_millis(
                self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            ),
            request_timeout: Duration::from_millis(
                self.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
            ),
            max_retry: self.max_retry.unwrap_or(defaults.max_retry),
            character_timeout: Duration::from_millis(
                self.character_timeout_ms
                    .unwrap_or(defaults.character_timeout_ms),
            ),
            min_claim_timeout: Duration::from_millis(
                self.min_claim_timeout_ms
                    .unwrap_or(defaults.min_claim_timeout_ms),
            ),
            command_delay: Duration::from_millis(self.command_delay_ms),
        }
    }

    /// Transport parameters
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            kind: self.transport_kind(),
            target: self.port.trim().to_string(),
            own_port: self.own_port,
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            logging: self.logging,
            ..ConnectionParams::default()
        }
    }

    /// Validate the device
    pub fn validate(&self) -> ConfigResult<()> {
        let out_of_range = |key: &str, value: String| ConfigError::ValueOutOfRange {
            key: format!("devices.{}.{}", self.name, key),
            value,
        };

        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingKey("devices.name".to_string()));
        }
        if self.port.trim().is_empty() {
            return Err(ConfigError::MissingKey(format!("devices.{}.port", self.name)));
        }
        if !self.dialect.supports(self.category) {
            return Err(ConfigError::Unsupported {
                device: self.name.clone(),
                what: format!("the {} dialect", self.dialect),
            });
        }
        let transport = self.transport_kind();
        if !self.dialect.transports().contains(&transport) {
            return Err(ConfigError::Unsupported {
                device: self.name.clone(),
                what: format!("{} with the {} dialect", transport, self.dialect),
            });
        }
        if transport != TransportKind::Serial && !self.port.contains(':') {
            return Err(out_of_range("port", self.port.clone()));
        }

        let timing = self.timing();
        if timing.poll_interval.is_zero() {
            return Err(out_of_range("poll_interval_ms", "0".to_string()));
        }
        if timing.request_timeout.is_zero() {
            return Err(out_of_range("request_timeout_ms", "0".to_string()));
        }
        if timing.max_retry == 0 {
            return Err(out_of_range("max_retry", "0".to_string()));
        }
        if transport == TransportKind::Serial {
            if self.baud_rate == 0 {
                return Err(out_of_range("baud_rate", "0".to_string()));
            }
            if !(5..=8).contains(&self.data_bits) {
                return Err(out_of_range("data_bits", self.data_bits.to_string()));
            }
            if !(1..=2).contains(&self.stop_bits) {
                return Err(out_of_range("stop_bits", self.stop_bits.to_string()));
            }
        }
        Ok(())
    }
}

/// Log output of the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_filter")]
    pub filter: String,
    /// JSON lines instead of the pretty format
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Configured devices
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,
}

impl Config {
    /// Create new config with no devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match extension(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!(
            "Loaded {} device(s) from {}",
            config.devices.len(),
            path.display()
        );
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Validate every device and the uniqueness of names
    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.name.clone()));
            }
        }
        Ok(())
    }

    /// Device named `name`
    pub fn device(&self, name: &str) -> Option<&DeviceSettings> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Add a device, replacing one with the same name
    pub fn upsert_device(&mut self, device: DeviceSettings) {
        match self.devices.iter_mut().find(|d| d.name == device.name) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
    }

    /// Remove the device named `name`
    pub fn remove_device(&mut self, name: &str) -> Option<DeviceSettings> {
        let index = self.devices.iter().position(|d| d.name == name)?;
        Some(self.devices.remove(index))
    }
}

enum Format {
    Json,
    Toml,
}

fn extension(path: &Path) -> ConfigResult<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or_default().to_string(),
        )),
    }
}
