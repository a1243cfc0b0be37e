//! Byte transports to the simulated controllers
//!
//! A [`Transport`] is one serial port, TCP client socket or UDP socket.
//! Transports are created lazily by a [`TransportFactory`] whenever the
//! command channel needs an open link, and dropped when it is closed.

pub mod logging;
pub mod scripted;
pub mod serial;
pub mod tcp;
pub mod udp;

pub use logging::LoggingMode;

use possim_core::TransportError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Transport family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Serial port
    Serial,
    /// TCP client socket
    Tcp,
    /// UDP socket
    Udp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Serial parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Byte channel to one simulated controller.
///
/// `read` differs per family: stream transports block up to the timeout
/// for at least one byte and return what is available (at most `max`);
/// datagram transports return one whole datagram or nothing. An empty
/// result means the timeout expired.
pub trait Transport: Send {
    /// Target address as configured
    fn target(&self) -> &str;

    /// Transport family
    fn kind(&self) -> TransportKind;

    /// Open the channel.
    ///
    /// Safe to call again after a failed attempt. `was_in_error` tells
    /// the transport that the previous attempt failed, so repeated
    /// failures can be logged quietly.
    fn open(&mut self, was_in_error: bool) -> TransportResult<()>;

    /// Close the channel
    fn close(&mut self) -> TransportResult<()>;

    /// Whether the channel is open
    fn is_open(&self) -> bool;

    /// Write a complete frame
    fn write(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Read up to `max` bytes (stream) or one datagram
    fn read(&mut self, max: usize) -> TransportResult<Vec<u8>>;

    /// Bytes that can be read without blocking
    fn available(&mut self) -> TransportResult<usize>;

    /// Timeout for subsequent reads
    fn set_timeout(&mut self, timeout: Duration) -> TransportResult<()>;

    /// Drop pending input
    fn flush(&mut self) -> TransportResult<()>;

    /// I/O trace format
    fn logging(&self) -> LoggingMode;
}

/// Creates transports for one target
pub trait TransportFactory: Send + Sync {
    /// Target address the created transports connect to
    fn target(&self) -> String;

    /// Create a new, unopened transport
    fn create(&self) -> TransportResult<Box<dyn Transport>>;
}

/// Connection parameters for the real transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Transport family
    pub kind: TransportKind,
    /// Serial port name, or `host:port` for sockets
    pub target: String,
    /// Local port for sockets, 0 lets the OS choose
    pub own_port: u16,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Serial data bits (5-8)
    pub data_bits: u8,
    /// Serial stop bits (1-2)
    pub stop_bits: u8,
    /// Serial parity
    pub parity: SerialParity,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// I/O trace format
    pub logging: LoggingMode,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            kind: TransportKind::Serial,
            target: String::new(),
            own_port: 0,
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 2,
            parity: SerialParity::None,
            connect_timeout: Duration::from_millis(1500),
            logging: LoggingMode::default(),
        }
    }
}

impl ConnectionParams {
    /// Serial parameters with the default line settings
    pub fn serial(port: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Serial,
            target: port.into(),
            ..Default::default()
        }
    }

    /// TCP client parameters
    pub fn tcp(target: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Tcp,
            target: target.into(),
            ..Default::default()
        }
    }

    /// UDP parameters
    pub fn udp(target: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Udp,
            target: target.into(),
            ..Default::default()
        }
    }

    /// Set the local port
    pub fn with_own_port(mut self, own_port: u16) -> Self {
        self.own_port = own_port;
        self
    }

    /// Set the I/O trace format
    pub fn with_logging(mut self, logging: LoggingMode) -> Self {
        self.logging = logging;
        self
    }
}

impl TransportFactory for ConnectionParams {
    fn target(&self) -> String {
        self.target.clone()
    }

    fn create(&self) -> TransportResult<Box<dyn Transport>> {
        if self.target.trim().is_empty() {
            return Err(TransportError::InvalidParameters {
                reason: "empty target".to_string(),
            });
        }
        Ok(match self.kind {
            TransportKind::Serial => Box::new(serial::SerialTransport::new(self.clone())?),
            TransportKind::Tcp => Box::new(tcp::TcpTransport::new(self.clone())),
            TransportKind::Udp => Box::new(udp::UdpTransport::new(self.clone())),
        })
    }
}

/// Pool key for a target: trimmed, host part lower-cased for sockets
pub fn normalize_target(kind: TransportKind, target: &str) -> String {
    let target = target.trim();
    match kind {
        TransportKind::Serial => format!("{}:{}", kind, target),
        TransportKind::Tcp | TransportKind::Udp => {
            format!("{}:{}", kind, target.to_ascii_lowercase())
        }
    }
}

/// Parse `host:port` into a socket address
pub(crate) fn resolve(target: &str) -> TransportResult<std::net::SocketAddr> {
    use std::net::ToSocketAddrs;

    target
        .trim()
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| TransportError::InvalidTarget {
            target: target.to_string(),
        })
}

/// Map a timed-out read to "no data"
pub(crate) fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}
