//! In-memory simulated controller
//!
//! [`ScriptedDevice`] stands in for a controller simulator: a responder
//! closure answers each written frame, and tests can go silent, refuse
//! opens, fail writes or push unsolicited frames. It is also a
//! [`TransportFactory`], so it plugs into a connection the same way the
//! real transports do.

use super::logging::trace_io;
use super::{LoggingMode, Transport, TransportFactory, TransportKind, TransportResult};
use parking_lot::{Condvar, Mutex};
use possim_core::TransportError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct ScriptState {
    responder: Option<Responder>,
    silent: bool,
    refuse_open: bool,
    fail_writes: bool,
    disconnected: bool,
    open: bool,
    opens: usize,
    closes: usize,
    writes: Vec<Vec<u8>>,
    inbound: VecDeque<Vec<u8>>,
}

struct Shared {
    state: Mutex<ScriptState>,
    readable: Condvar,
}

/// Handle to a simulated controller
#[derive(Clone)]
pub struct ScriptedDevice {
    target: String,
    kind: TransportKind,
    logging: LoggingMode,
    shared: Arc<Shared>,
}

impl ScriptedDevice {
    /// Stream device (serial or TCP semantics)
    pub fn stream(target: impl Into<String>) -> Self {
        Self::new(target.into(), TransportKind::Tcp)
    }

    /// Datagram device (UDP semantics)
    pub fn datagram(target: impl Into<String>) -> Self {
        Self::new(target.into(), TransportKind::Udp)
    }

    fn new(target: String, kind: TransportKind) -> Self {
        Self {
            target,
            kind,
            logging: LoggingMode::Escape,
            shared: Arc::new(Shared {
                state: Mutex::new(ScriptState::default()),
                readable: Condvar::new(),
            }),
        }
    }

    /// Answer written frames with `responder`; `None` or an empty reply sends nothing.
    ///
    /// The responder runs with the device locked and must not call back
    /// into this handle.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.shared.state.lock().responder = Some(Box::new(responder));
    }

    /// Stop (or resume) answering
    pub fn set_silent(&self, silent: bool) {
        self.shared.state.lock().silent = silent;
    }

    /// Make subsequent opens fail
    pub fn refuse_open(&self, refuse: bool) {
        self.shared.state.lock().refuse_open = refuse;
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.shared.state.lock().fail_writes = fail;
    }

    /// Report the peer as gone on the next read
    pub fn disconnect(&self) {
        self.shared.state.lock().disconnected = true;
        self.shared.readable.notify_all();
    }

    /// Queue an unsolicited frame
    pub fn push(&self, frame: impl Into<Vec<u8>>) {
        let frame = frame.into();
        if frame.is_empty() {
            return;
        }
        self.shared.state.lock().inbound.push_back(frame);
        self.shared.readable.notify_all();
    }

    /// Every frame written so far
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().writes.clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.shared.state.lock().writes.clear();
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.shared.state.lock().opens
    }

    /// Number of closes
    pub fn close_count(&self) -> usize {
        self.shared.state.lock().closes
    }

    /// Whether a transport is currently open on this device
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    /// Shared factory for a connection
    pub fn factory(&self) -> Arc<dyn TransportFactory> {
        Arc::new(self.clone())
    }
}

impl TransportFactory for ScriptedDevice {
    fn target(&self) -> String {
        self.target.clone()
    }

    fn create(&self) -> TransportResult<Box<dyn Transport>> {
        Ok(Box::new(ScriptedTransport {
            device: self.clone(),
            timeout: Duration::from_millis(100),
            open: false,
        }))
    }
}

/// Transport end of a [`ScriptedDevice`]
pub struct ScriptedTransport {
    device: ScriptedDevice,
    timeout: Duration,
    open: bool,
}

impl ScriptedTransport {
    fn check_open(&self) -> TransportResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }
}

impl Transport for ScriptedTransport {
    fn target(&self) -> &str {
        &self.device.target
    }

    fn kind(&self) -> TransportKind {
        self.device.kind
    }

    fn open(&mut self, _was_in_error: bool) -> TransportResult<()> {
        if self.open {
            return Ok(());
        }
        let mut state = self.device.shared.state.lock();
        if state.refuse_open {
            return Err(TransportError::FailedToOpen {
                target: self.device.target.clone(),
                reason: "connection refused".to_string(),
            });
        }
        state.open = true;
        state.opens += 1;
        state.disconnected = false;
        state.inbound.clear();
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        if self.open {
            self.open = false;
            let mut state = self.device.shared.state.lock();
            state.open = false;
            state.closes += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        self.check_open()?;
        let mut state = self.device.shared.state.lock();
        if state.fail_writes {
            return Err(TransportError::Write {
                reason: "broken pipe".to_string(),
            });
        }
        trace_io(&self.device.target, "<<", self.device.logging, data);
        state.writes.push(data.to_vec());
        if state.silent {
            return Ok(());
        }
        let reply = state.responder.as_mut().and_then(|respond| respond(data));
        if let Some(reply) = reply.filter(|r| !r.is_empty()) {
            state.inbound.push_back(reply);
            self.device.shared.readable.notify_all();
        }
        Ok(())
    }

    fn read(&mut self, max: usize) -> TransportResult<Vec<u8>> {
        self.check_open()?;
        let deadline = Instant::now() + self.timeout;
        let mut state = self.device.shared.state.lock();
        loop {
            if state.disconnected {
                return Err(TransportError::Closed {
                    target: self.device.target.clone(),
                });
            }
            if !state.inbound.is_empty() {
                break;
            }
            if self
                .device
                .shared
                .readable
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if state.inbound.is_empty() && !state.disconnected {
                    return Ok(Vec::new());
                }
            }
        }

        let data = if self.device.kind == TransportKind::Udp {
            state.inbound.pop_front().unwrap_or_default()
        } else {
            let max = max.max(1);
            let mut data = Vec::new();
            while data.len() < max {
                let Some(front) = state.inbound.front_mut() else {
                    break;
                };
                let take = front.len().min(max - data.len());
                data.extend(front.drain(..take));
                if front.is_empty() {
                    state.inbound.pop_front();
                }
            }
            data
        };
        trace_io(&self.device.target, ">>", self.device.logging, &data);
        Ok(data)
    }

    fn available(&mut self) -> TransportResult<usize> {
        self.check_open()?;
        let state = self.device.shared.state.lock();
        Ok(if self.device.kind == TransportKind::Udp {
            state.inbound.front().map_or(0, Vec::len)
        } else {
            state.inbound.iter().map(Vec::len).sum()
        })
    }

    fn set_timeout(&mut self, timeout: Duration) -> TransportResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn flush(&mut self) -> TransportResult<()> {
        self.check_open()?;
        self.device.shared.state.lock().inbound.clear();
        Ok(())
    }

    fn logging(&self) -> LoggingMode {
        self.device.logging
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
