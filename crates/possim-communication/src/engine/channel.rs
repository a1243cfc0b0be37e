//! Command channel
//!
//! Serializes all I/O on one transport. The transport is opened lazily on
//! the first use after a close; the poller and session calls share it
//! through the channel's lock.

use super::checker::{validate_responses, ResponseChecker};
use super::Timing;
use crate::communication::udp::MAX_DATAGRAM;
use crate::communication::{Transport, TransportFactory};
use parking_lot::{Mutex, MutexGuard};
use possim_core::{DeviceError, ProtocolError, Result, TransportError, WaitGate};
use std::sync::Arc;
use std::time::Instant;

struct Link {
    transport: Option<Box<dyn Transport>>,
    in_error: bool,
}

/// Shared, lazily opened transport of one connection
pub struct CommandChannel {
    target: String,
    factory: Arc<dyn TransportFactory>,
    timing: Timing,
    link: Mutex<Link>,
    poll_gate: Arc<WaitGate>,
}

impl CommandChannel {
    /// Create a closed channel.
    ///
    /// `poll_gate` is signalled when a write fails so the poller runs a
    /// cycle right away and publishes the connection as offline.
    pub fn new(factory: Arc<dyn TransportFactory>, timing: Timing, poll_gate: Arc<WaitGate>) -> Self {
        Self {
            target: factory.target(),
            factory,
            timing,
            link: Mutex::new(Link {
                transport: None,
                in_error: false,
            }),
            poll_gate,
        }
    }

    /// Target address
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Timing of the owning connection
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.link.lock().transport.is_some()
    }

    /// Whether the last open or I/O failed
    pub fn in_error(&self) -> bool {
        self.link.lock().in_error
    }

    /// Write one frame.
    ///
    /// Opens the transport if needed; an open failure is returned as is.
    /// A write failure closes the transport and wakes the poller instead
    /// of failing the call; the caller observes the offline state through
    /// its bounded wait.
    pub fn send(&self, frame: &[u8]) -> std::result::Result<(), TransportError> {
        if !self.timing.command_delay.is_zero() {
            std::thread::sleep(self.timing.command_delay);
        }
        let mut link = self.link.lock();
        let transport = self.open_link(&mut link)?;
        if let Err(e) = transport.write(frame) {
            tracing::warn!("{}: write failed: {}", self.target, e);
            Self::drop_transport(&mut link, &self.target);
            link.in_error = true;
            drop(link);
            self.poll_gate.signal();
        }
        Ok(())
    }

    /// Run `f` on the open transport under the channel lock.
    ///
    /// Any transport or protocol error from `f` closes the transport.
    pub fn exchange<T>(&self, f: impl FnOnce(&mut dyn Transport, &Timing) -> Result<T>) -> Result<T> {
        let link = self.link.lock();
        self.exchange_on(link, f)
    }

    fn exchange_on<T>(
        &self,
        mut link: MutexGuard<'_, Link>,
        f: impl FnOnce(&mut dyn Transport, &Timing) -> Result<T>,
    ) -> Result<T> {
        let transport = self.open_link(&mut link)?;
        match f(transport, &self.timing) {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_communication_error() {
                    tracing::debug!("{}: exchange failed: {}", self.target, e);
                    Self::drop_transport(&mut link, &self.target);
                    link.in_error = true;
                }
                Err(e)
            }
        }
    }

    /// Send a combined request and wait for a matching response.
    ///
    /// The commands are joined with `,` into one datagram. Each attempt
    /// waits up to the request timeout for a response that `checker`
    /// accepts; unmatched datagrams are skipped. After `max_retry`
    /// attempts the transport is closed and
    /// [`ProtocolError::NoResponse`] returned.
    pub fn send_and_await(&self, commands: &[String], checker: &dyn ResponseChecker) -> Result<Vec<String>> {
        let link = self.link.lock();
        self.exchange_on(link, |transport, timing| {
            self.await_responses(transport, timing, commands, checker, None)
        })
    }

    /// [`send_and_await`](Self::send_and_await) bounded by `deadline`.
    ///
    /// Waiting for the channel lock counts against the deadline. When it
    /// passes before every attempt ran its full request timeout the call
    /// fails with [`DeviceError::Timeout`] and the transport stays open.
    pub fn send_and_await_until(
        &self,
        commands: &[String],
        checker: &dyn ResponseChecker,
        deadline: Instant,
    ) -> Result<Vec<String>> {
        let Some(link) = self.link.try_lock_until(deadline) else {
            tracing::debug!("{}: channel busy until deadline", self.target);
            return Err(DeviceError::timeout(self.timing.response_bound()).into());
        };
        self.exchange_on(link, |transport, timing| {
            self.await_responses(transport, timing, commands, checker, Some(deadline))
        })
    }

    fn await_responses(
        &self,
        transport: &mut dyn Transport,
        timing: &Timing,
        commands: &[String],
        checker: &dyn ResponseChecker,
        deadline: Option<Instant>,
    ) -> Result<Vec<String>> {
        let request = commands.join(",");
        transport.flush()?;
        let mut cut_short = false;
        for attempt in 1..=timing.attempts() {
            let started = Instant::now();
            let mut attempt_end = started + timing.request_timeout;
            if let Some(deadline) = deadline {
                if deadline <= started {
                    cut_short = true;
                    break;
                }
                if deadline < attempt_end {
                    attempt_end = deadline;
                    cut_short = true;
                }
            }
            if attempt > 1 {
                tracing::debug!("{}: retry {} for {}", self.target, attempt, request);
            }
            transport.write(request.as_bytes())?;
            loop {
                let remaining = attempt_end.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                transport.set_timeout(remaining)?;
                let datagram = transport.read(MAX_DATAGRAM)?;
                if datagram.is_empty() {
                    continue;
                }
                let text = String::from_utf8_lossy(&datagram);
                match validate_responses(commands, &text, checker) {
                    Ok(values) => return Ok(values),
                    Err(result) => tracing::debug!(
                        "{}: response {} rejected ({})",
                        self.target,
                        text,
                        result.code()
                    ),
                }
            }
        }
        if cut_short {
            return Err(DeviceError::timeout(timing.response_bound()).into());
        }
        Err(ProtocolError::NoResponse {
            attempts: timing.attempts(),
        }
        .into())
    }

    /// Close the transport
    pub fn close(&self) {
        let mut link = self.link.lock();
        Self::drop_transport(&mut link, &self.target);
    }

    fn open_link<'a>(&self, link: &'a mut Link) -> std::result::Result<&'a mut dyn Transport, TransportError> {
        if link.transport.is_none() {
            let mut transport = self.factory.create()?;
            match transport.open(link.in_error) {
                Ok(()) => {
                    if link.in_error {
                        tracing::info!("{}: connection restored", self.target);
                    }
                    link.in_error = false;
                    link.transport = Some(transport);
                }
                Err(e) => {
                    link.in_error = true;
                    return Err(e);
                }
            }
        }
        match link.transport.as_deref_mut() {
            Some(transport) => Ok(transport),
            None => Err(TransportError::NotOpen),
        }
    }

    fn drop_transport(link: &mut Link, target: &str) {
        if let Some(mut transport) = link.transport.take() {
            if let Err(e) = transport.close() {
                tracing::debug!("{}: close failed: {}", target, e);
            }
        }
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("target", &self.target)
            .field("open", &self.is_open())
            .finish()
    }
}
