use possim_communication::{DeviceCategory, LoggingMode, TransportKind};
use possim_settings::{
    Config, ConfigError, DeviceSettings, DialectKind, SettingsError, SettingsPersistence,
};
use std::time::Duration;
use tempfile::TempDir;

fn sample() -> Config {
    let mut config = Config::new();
    config.upsert_device(DeviceSettings::new(
        "drawer",
        DeviceCategory::CashDrawer,
        DialectKind::Printer,
        "/dev/ttyUSB0",
    ));
    let mut bills = DeviceSettings::new(
        "bills",
        DeviceCategory::BillAcceptor,
        DialectKind::Udp,
        "127.0.0.1:45000",
    );
    bills.request_timeout_ms = Some(800);
    bills.logging = LoggingMode::Hex;
    config.upsert_device(bills);
    config.logging.filter = "possim=debug".to_string();
    config
}

#[test]
fn test_toml_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let config = sample();
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
    let bills = loaded.device("bills").unwrap();
    assert_eq!(bills.timing().request_timeout, Duration::from_millis(800));
    assert_eq!(bills.connection_params().kind, TransportKind::Udp);
}

#[test]
fn test_json_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    let config = sample();
    config.save_to_file(&path).unwrap();
    assert_eq!(Config::load_from_file(&path).unwrap(), config);
}

#[test]
fn test_unknown_extension_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    let err = sample().save_to_file(&path).unwrap_err();
    assert!(matches!(
        err,
        SettingsError::Config(ConfigError::UnsupportedFormat(ref ext)) if ext == "yaml"
    ));
}

#[test]
fn test_invalid_file_is_not_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
            [[devices]]
            name = "belt"
            category = "Belt"
            dialect = "subsystem"
            port = "kitchen:4000"
        "#,
    )
    .unwrap();
    let err = Config::load_from_file(&path).unwrap_err();
    assert!(matches!(
        err,
        SettingsError::Config(ConfigError::Unsupported { .. })
    ));
}

#[test]
fn test_persistence_creates_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("possim").join("config.toml");

    let mut persistence = SettingsPersistence::load_or_default(&path).unwrap();
    assert!(persistence.config().devices.is_empty());
    *persistence.config_mut() = sample();
    persistence.save().unwrap();
    assert!(path.exists());

    let reloaded = SettingsPersistence::load_from_file(&path).unwrap();
    assert_eq!(reloaded.config(), persistence.config());
    assert_eq!(reloaded.path(), path.as_path());
}
