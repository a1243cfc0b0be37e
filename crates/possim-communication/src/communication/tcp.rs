//! TCP client transport
//!
//! Used by the printer (when configured for TCP) and the subsystem
//! dialect. A peer closing the connection is reported as
//! [`TransportError::Closed`] so the poller marks the device offline.

use super::logging::trace_io;
use super::{resolve, ConnectionParams, LoggingMode, Transport, TransportKind, TransportResult};
use possim_core::TransportError;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// TCP client transport
pub struct TcpTransport {
    params: ConnectionParams,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create an unopened transport
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            timeout: Duration::from_millis(100),
            stream: None,
        }
    }

    fn stream(&mut self) -> TransportResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }

    fn closed(&self) -> TransportError {
        TransportError::Closed {
            target: self.params.target.clone(),
        }
    }
}

impl Transport for TcpTransport {
    fn target(&self) -> &str {
        &self.params.target
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn open(&mut self, was_in_error: bool) -> TransportResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = resolve(&self.params.target)?;
        if self.params.own_port != 0 {
            tracing::debug!(
                "Own port {} ignored for TCP target {}",
                self.params.own_port,
                self.params.target
            );
        }

        let fail = |e: std::io::Error| {
            if was_in_error {
                tracing::debug!("{} still unreachable: {}", self.params.target, e);
            } else {
                tracing::warn!("Failed to connect to {}: {}", self.params.target, e);
            }
            TransportError::FailedToOpen {
                target: self.params.target.clone(),
                reason: e.to_string(),
            }
        };

        let stream = TcpStream::connect_timeout(&addr, self.params.connect_timeout).map_err(fail)?;
        stream.set_nodelay(true).map_err(fail)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(fail)?;
        tracing::info!("Connected to {}", self.params.target);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        if let Some(stream) = self.stream.take() {
            // peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
            tracing::debug!("Disconnected from {}", self.params.target);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        let logging = self.params.logging;
        let target = self.params.target.clone();
        let stream = self.stream()?;
        stream
            .write_all(data)
            .and_then(|_| stream.flush())
            .map_err(|e| TransportError::Write {
                reason: e.to_string(),
            })?;
        trace_io(&target, "<<", logging, data);
        Ok(())
    }

    fn read(&mut self, max: usize) -> TransportResult<Vec<u8>> {
        let logging = self.params.logging;
        let target = self.params.target.clone();
        let stream = self.stream()?;
        let mut buffer = vec![0u8; max.max(1)];
        match stream.read(&mut buffer) {
            Ok(0) => Err(self.closed()),
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
        let closed = self.closed();
        let stream = self.stream()?;
        let mut probe = [0u8; 1024];
        stream
            .set_nonblocking(true)
            .map_err(|e| TransportError::Read {
                reason: e.to_string(),
            })?;
        let peeked = stream.peek(&mut probe);
        let restored = stream.set_nonblocking(false);
        let available = match peeked {
            Ok(0) => return Err(closed),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => 0,
            Err(e) => {
                return Err(TransportError::Read {
                    reason: e.to_string(),
                })
            }
        };
        restored.map_err(|e| TransportError::Read {
            reason: e.to_string(),
        })?;
        Ok(available)
    }

    fn set_timeout(&mut self, timeout: Duration) -> TransportResult<()> {
        // a zero timeout would mean "block forever"
        self.timeout = timeout.max(Duration::from_millis(1));
        let timeout = self.timeout;
        if let Some(stream) = self.stream.as_mut() {
            stream
                .set_read_timeout(Some(timeout))
                .map_err(|e| TransportError::InvalidParameters {
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn flush(&mut self) -> TransportResult<()> {
        let mut pending = self.available()?;
        while pending > 0 {
            let stream = self.stream()?;
            let mut sink = vec![0u8; pending];
            stream.read(&mut sink).map_err(|e| TransportError::Flush {
                reason: e.to_string(),
            })?;
            pending = self.available()?;
        }
        Ok(())
    }

    fn logging(&self) -> LoggingMode {
        self.params.logging
    }
}
