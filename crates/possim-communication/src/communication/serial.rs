//! Serial port transport
//!
//! Used by the printer dialect. Line settings come from
//! [`ConnectionParams`]; the controller simulators default to 9600 baud,
//! 8 data bits, 2 stop bits and no parity.

use super::logging::trace_io;
use super::{ConnectionParams, LoggingMode, SerialParity, Transport, TransportKind, TransportResult};
use possim_core::TransportError;
use serialport::{ClearBuffer, DataBits, FlowControl, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,
}

/// List available serial ports on the system
pub fn list_ports() -> TransportResult<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports
            .iter()
            .map(|port| SerialPortInfo {
                port_name: port.port_name.clone(),
                description: get_port_description(port),
            })
            .collect()),
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(TransportError::Read {
                reason: format!("Failed to enumerate ports: {}", e),
            })
        }
    }
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

fn to_data_bits(bits: u8) -> TransportResult<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(TransportError::InvalidParameters {
            reason: format!("Invalid data bits: {}", bits),
        }),
    }
}

fn to_stop_bits(bits: u8) -> TransportResult<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(TransportError::InvalidParameters {
            reason: format!("Invalid stop bits: {}", bits),
        }),
    }
}

/// Serial port transport backed by the `serialport` crate
pub struct SerialTransport {
    params: ConnectionParams,
    data_bits: DataBits,
    stop_bits: StopBits,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Validate line settings; the port is opened by [`Transport::open`]
    pub fn new(params: ConnectionParams) -> TransportResult<Self> {
        let data_bits = to_data_bits(params.data_bits)?;
        let stop_bits = to_stop_bits(params.stop_bits)?;
        Ok(Self {
            params,
            data_bits,
            stop_bits,
            timeout: Duration::from_millis(100),
            port: None,
        })
    }

    fn port(&mut self) -> TransportResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Transport for SerialTransport {
    fn target(&self) -> &str {
        &self.params.target
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn open(&mut self, was_in_error: bool) -> TransportResult<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let builder = serialport::new(&self.params.target, self.params.baud_rate)
            .timeout(self.timeout)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(to_serialport_parity(self.params.parity))
            .flow_control(FlowControl::None);

        match builder.open() {
            Ok(port) => {
                tracing::info!(
                    "Opened serial port {} at {} baud",
                    self.params.target,
                    self.params.baud_rate
                );
                self.port = Some(port);
                Ok(())
            }
            Err(e) => {
                if was_in_error {
                    tracing::debug!("Serial port {} still unavailable: {}", self.params.target, e);
                } else {
                    tracing::warn!("Failed to open serial port {}: {}", self.params.target, e);
                }
                Err(TransportError::FailedToOpen {
                    target: self.params.target.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn close(&mut self) -> TransportResult<()> {
        if self.port.take().is_some() {
            tracing::debug!("Closed serial port {}", self.params.target);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        let logging = self.params.logging;
        let target = self.params.target.clone();
        let port = self.port()?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| TransportError::Write {
                reason: e.to_string(),
            })?;
        trace_io(&target, "<<", logging, data);
        Ok(())
    }

    fn read(&mut self, max: usize) -> TransportResult<Vec<u8>> {
        let logging = self.params.logging;
        let target = self.params.target.clone();
        let port = self.port()?;
        let mut buffer = vec![0u8; max.max(1)];
        match port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                trace_io(&target, ">>", logging, &buffer);
                Ok(buffer)
            }
            Err(e) if super::is_timeout(&e) => Ok(Vec::new()),
            Err(e) => Err(TransportError::Read {
                reason: e.to_string(),
            }),
        }
    }

    fn available(&mut self) -> TransportResult<usize> {
        let port = self.port()?;
        port.bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| TransportError::Read {
                reason: e.to_string(),
            })
    }

    fn set_timeout(&mut self, timeout: Duration) -> TransportResult<()> {
        self.timeout = timeout.max(Duration::from_millis(1));
        let timeout = self.timeout;
        if let Some(port) = self.port.as_mut() {
            port.set_timeout(timeout)
                .map_err(|e| TransportError::InvalidParameters {
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn flush(&mut self) -> TransportResult<()> {
        let port = self.port()?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| TransportError::Flush {
                reason: e.to_string(),
            })
    }

    fn logging(&self) -> LoggingMode {
        self.params.logging
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_settings_validated() {
        let mut params = ConnectionParams::serial("/dev/ttyS0");
        params.data_bits = 9;
        assert!(matches!(
            SerialTransport::new(params),
            Err(TransportError::InvalidParameters { .. })
        ));

        let mut params = ConnectionParams::serial("/dev/ttyS0");
        params.stop_bits = 3;
        assert!(SerialTransport::new(params).is_err());
    }

    #[test]
    fn test_unopened_port_rejects_io() {
        let mut transport =
            SerialTransport::new(ConnectionParams::serial("/dev/ttyS0")).unwrap();
        assert!(!transport.is_open());
        assert_eq!(transport.write(b"x"), Err(TransportError::NotOpen));
        assert_eq!(transport.read(1), Err(TransportError::NotOpen));
        assert!(transport.close().is_ok());
    }

    #[test]
    fn test_missing_port_fails_to_open() {
        let mut transport =
            SerialTransport::new(ConnectionParams::serial("/dev/possim-no-such-port")).unwrap();
        assert!(matches!(
            transport.open(false),
            Err(TransportError::FailedToOpen { .. })
        ));
        assert!(!transport.is_open());
    }
}
