//! Errors of loading, saving and validating device configuration

use std::io;
use thiserror::Error;

/// Settings file errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot read configuration {0}")]
    LoadError(String),

    #[error("Cannot write configuration {0}")]
    SaveError(String),

    /// Platform config directory missing or not creatable
    #[error("Configuration directory unavailable: {0}")]
    ConfigDirectory(String),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cannot encode TOML: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration content errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing key {0}")]
    MissingKey(String),

    /// File extension other than `toml` or `json`
    #[error("Unsupported file format '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid value {value} for {key}")]
    ValueOutOfRange { key: String, value: String },

    #[error("Device {0} configured twice")]
    DuplicateDevice(String),

    /// Category not available on the dialect or transport
    #[error("Device '{device}' cannot use {what}")]
    Unsupported { device: String, what: String },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

pub type ConfigResult<T> = Result<T, ConfigError>;
