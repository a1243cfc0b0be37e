//! # possim
//!
//! Connection engine for simulated point-of-sale peripherals.
//!
//! ## Architecture
//!
//! possim is organized as a workspace with multiple crates:
//!
//! 1. **possim-core** - Errors, wait gates, device payloads, event bus
//! 2. **possim-communication** - Transports, connection engine, printer/subsystem/UDP dialects
//! 3. **possim-settings** - Device configuration and persistence
//! 4. **possim** - Monitor and the binary that claims the configured devices
//!
//! ## Devices
//!
//! - **Printer controller**: cash drawer and receipt printer over serial or TCP
//! - **Kitchen subsystem**: bump bars and remote order displays over TCP
//! - **UDP controller**: cash drawer, belt and cash box devices

pub mod monitor;

pub use monitor::{Monitor, MonitoredDevice};

pub use possim_communication::{
    BumpBar, CashDevice, CashDrawer, Connection, ConnectionParams, ConnectionPool,
    DeviceCategory, PosPrinter, RemoteOrderDisplay, Timing, UdpCashDrawer,
};
pub use possim_core::{DeviceError, DeviceEvent, Error, EventBus, EventFilter, PowerState, Result};
pub use possim_settings::{Config, DeviceSettings, DialectKind, LoggingSettings, SettingsPersistence};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support, falling back to the configured filter
/// - Console output, pretty or JSON lines
/// - Target, thread and line information
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if settings.json {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_thread_names(true)
            .json();
        registry.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();
        registry.with(fmt_layer).try_init()?;
    }

    Ok(())
}
