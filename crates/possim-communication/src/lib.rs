//! # possim Communication
//!
//! Transports, the connection engine and device dialects for possim.
//! Supports serial, TCP and UDP controllers.
//! Includes dialects for the printer with cash drawer, the kitchen
//! subsystem (bump bars, order displays) and the UDP cash devices.

pub mod communication;
pub mod dialect;
pub mod engine;

pub use communication::{
    logging::LoggingMode,
    normalize_target,
    scripted::ScriptedDevice,
    serial::{list_ports, SerialPortInfo},
    ConnectionParams, SerialParity, Transport, TransportFactory, TransportKind,
};

pub use engine::{
    CategoryStrategy, CheckResult, CheckerChain, CommandChannel, Connection, ConnectionPool,
    DeviceCategory, DeviceSession, Dialect, PollerState, ResponseChecker, Snapshot, Timing,
};

pub use dialect::printer::{CashDrawer, PosPrinter, PrinterDialect, PrinterSnapshot};
pub use dialect::subsystem::{BumpBar, RemoteOrderDisplay, SubsystemDialect, SubsystemSnapshot};
pub use dialect::udp::{Belt, CashCategory, CashDevice, UdpCashDrawer, UdpDialect, UdpSnapshot};
