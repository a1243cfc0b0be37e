//! UDP transport
//!
//! Binds the configured own port and connects to the target, so only
//! datagrams from the controller are received. Each read returns one
//! datagram.

use super::logging::trace_io;
use super::{resolve, ConnectionParams, LoggingMode, Transport, TransportKind, TransportResult};
use possim_core::TransportError;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Largest datagram the controller sends
pub const MAX_DATAGRAM: usize = 4096;

/// UDP socket transport
pub struct UdpTransport {
    params: ConnectionParams,
    timeout: Duration,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    /// Create an unopened transport
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            timeout: Duration::from_millis(100),
            socket: None,
        }
    }

    fn socket(&self) -> TransportResult<&UdpSocket> {
        self.socket.as_ref().ok_or(TransportError::NotOpen)
    }

    /// Local address of the open socket
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.socket()?
            .local_addr()
            .map_err(|e| TransportError::Read {
                reason: e.to_string(),
            })
    }
}

impl Transport for UdpTransport {
    fn target(&self) -> &str {
        &self.params.target
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn open(&mut self, was_in_error: bool) -> TransportResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let peer = resolve(&self.params.target)?;
        let local: SocketAddr = if peer.is_ipv4() {
            ([0u8; 4], self.params.own_port).into()
        } else {
            ([0u16; 8], self.params.own_port).into()
        };

        let opened = UdpSocket::bind(local).and_then(|socket| {
            socket.connect(peer)?;
            socket.set_read_timeout(Some(self.timeout))?;
            Ok(socket)
        });
        match opened {
            Ok(socket) => {
                tracing::info!(
                    "UDP socket for {} bound to port {}",
                    self.params.target,
                    socket.local_addr().map(|a| a.port()).unwrap_or_default()
                );
                self.socket = Some(socket);
                Ok(())
            }
            Err(e) => {
                if was_in_error {
                    tracing::debug!("UDP socket for {} still unavailable: {}", self.params.target, e);
                } else {
                    tracing::warn!("Failed to open UDP socket for {}: {}", self.params.target, e);
                }
                Err(TransportError::FailedToOpen {
                    target: self.params.target.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn close(&mut self) -> TransportResult<()> {
        if self.socket.take().is_some() {
            tracing::debug!("Closed UDP socket for {}", self.params.target);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        self.socket()?
            .send(data)
            .map_err(|e| TransportError::Write {
                reason: e.to_string(),
            })?;
        trace_io(&self.params.target, "<<", self.params.logging, data);
        Ok(())
    }

    fn read(&mut self, max: usize) -> TransportResult<Vec<u8>> {
        let socket = self.socket()?;
        let mut buffer = vec![0u8; max.clamp(1, MAX_DATAGRAM)];
        match socket.recv(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                trace_io(&self.params.target, ">>", self.params.logging, &buffer);
                Ok(buffer)
            }
            Err(e) if super::is_timeout(&e) => Ok(Vec::new()),
            Err(e) => Err(TransportError::Read {
                reason: e.to_string(),
            }),
        }
    }

    fn available(&mut self) -> TransportResult<usize> {
        let socket = self.socket()?;
        let mut probe = vec![0u8; MAX_DATAGRAM];
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::Read {
                reason: e.to_string(),
            })?;
        let peeked = socket.peek(&mut probe);
        socket
            .set_nonblocking(false)
            .map_err(|e| TransportError::Read {
                reason: e.to_string(),
            })?;
        match peeked {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::Read {
                reason: e.to_string(),
            }),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> TransportResult<()> {
        self.timeout = timeout.max(Duration::from_millis(1));
        if let Some(socket) = self.socket.as_ref() {
            socket
                .set_read_timeout(Some(self.timeout))
                .map_err(|e| TransportError::InvalidParameters {
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn flush(&mut self) -> TransportResult<()> {
        let socket = self.socket()?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::Flush {
                reason: e.to_string(),
            })?;
        let mut sink = vec![0u8; MAX_DATAGRAM];
        // stale answers and ICMP errors from earlier sends are both discarded
        while let Ok(n) = socket.recv(&mut sink) {
            tracing::trace!("{} dropped stale datagram of {} bytes", self.params.target, n);
        }
        socket
            .set_nonblocking(false)
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
    fn test_datagram_exchange() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = peer.local_addr().unwrap().to_string();

        let mut transport = UdpTransport::new(ConnectionParams::udp(&target));
        transport.open(false).unwrap();
        transport.set_timeout(Duration::from_secs(2)).unwrap();
        transport.write(b"DRAWER:GetState").unwrap();

        let mut buffer = [0u8; 64];
        let (n, from) = peer.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"DRAWER:GetState");
        peer.send_to(b"DRAWER:GetState0", from).unwrap();
        peer.send_to(b"second", from).unwrap();

        assert_eq!(transport.read(MAX_DATAGRAM).unwrap(), b"DRAWER:GetState0".to_vec());
        assert_eq!(transport.read(MAX_DATAGRAM).unwrap(), b"second".to_vec());
    }

    #[test]
    fn test_flush_drops_pending_datagrams() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = peer.local_addr().unwrap().to_string();

        let mut transport = UdpTransport::new(ConnectionParams::udp(&target));
        transport.open(false).unwrap();
        let local = transport.local_addr().unwrap();
        peer.send_to(b"stale", ("127.0.0.1", local.port())).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        transport.flush().unwrap();
        transport.set_timeout(Duration::from_millis(20)).unwrap();
        assert!(transport.read(MAX_DATAGRAM).unwrap().is_empty());
    }

    #[test]
    fn test_closed_socket_rejects_io() {
        let mut transport = UdpTransport::new(ConnectionParams::udp("127.0.0.1:9"));
        assert_eq!(transport.write(b"x"), Err(TransportError::NotOpen));
        assert!(transport.close().is_ok());
    }
}
