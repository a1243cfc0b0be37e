//! possim Settings Crate
//!
//! Device configuration: which simulated controllers to connect to, with
//! per-dialect timing defaults, loaded from and saved to TOML or JSON
//! files in the platform config directory.

pub mod config;
pub mod error;
pub mod persistence;

pub use config::{Config, DeviceSettings, DialectDefaults, DialectKind, LoggingSettings};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
pub use persistence::SettingsPersistence;
