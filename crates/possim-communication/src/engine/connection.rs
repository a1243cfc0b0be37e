//! Reference counted connection with its poller
//!
//! The first acquire starts the poller and waits until its first cycle
//! has published a status; the last release stops the poller and closes
//! the transport. Acquire and release are serialized by the lifecycle
//! lock, which the poller thread never takes.

use super::channel::CommandChannel;
use super::poller::{Poller, PollerState};
use super::{Dialect, Snapshot, Timing};
use crate::communication::TransportFactory;
use parking_lot::{Mutex, RwLock};
use possim_core::{DeviceError, EventBus, PowerState, Result, WaitGate, WaitList};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State shared between a connection and its poller thread
pub(crate) struct Shared<D: Dialect> {
    pub(crate) target: String,
    pub(crate) dialect: D,
    pub(crate) channel: CommandChannel,
    pub(crate) timing: Timing,
    pub(crate) snapshot: RwLock<D::Snapshot>,
    pub(crate) events: EventBus,
    pub(crate) status_waiters: WaitList,
    pub(crate) start_waiters: WaitList,
    pub(crate) poll_gate: Arc<WaitGate>,
    pub(crate) initialized: AtomicBool,
    pub(crate) cycles_started: AtomicU64,
    pub(crate) cycles_completed: AtomicU64,
    state: AtomicU8,
}

impl<D: Dialect> Shared<D> {
    pub(crate) fn set_state(&self, state: PollerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

struct Lifecycle {
    open_count: usize,
    poller: Option<Poller>,
}

/// One connection to a simulated controller
pub struct Connection<D: Dialect> {
    shared: Arc<Shared<D>>,
    lifecycle: Mutex<Lifecycle>,
}

impl<D: Dialect> Connection<D> {
    /// Create an idle connection; nothing is opened until the first acquire
    pub fn new(dialect: D, factory: Arc<dyn TransportFactory>, timing: Timing) -> Self {
        let poll_gate = Arc::new(WaitGate::new());
        let channel = CommandChannel::new(factory, timing, poll_gate.clone());
        Self {
            shared: Arc::new(Shared {
                target: channel.target().to_string(),
                dialect,
                channel,
                timing,
                snapshot: RwLock::new(D::Snapshot::default()),
                events: EventBus::new(),
                status_waiters: WaitList::new(),
                start_waiters: WaitList::new(),
                poll_gate,
                initialized: AtomicBool::new(false),
                cycles_started: AtomicU64::new(0),
                cycles_completed: AtomicU64::new(0),
                state: AtomicU8::new(PollerState::Stopped as u8),
            }),
            lifecycle: Mutex::new(Lifecycle {
                open_count: 0,
                poller: None,
            }),
        }
    }

    /// Target address
    pub fn target(&self) -> &str {
        &self.shared.target
    }

    /// Protocol dialect
    pub fn dialect(&self) -> &D {
        &self.shared.dialect
    }

    /// Timing parameters
    pub fn timing(&self) -> &Timing {
        &self.shared.timing
    }

    /// Command channel for session commands
    pub fn channel(&self) -> &CommandChannel {
        &self.shared.channel
    }

    /// Events published by the poller
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Copy of the last published snapshot
    pub fn snapshot(&self) -> D::Snapshot {
        self.shared.snapshot.read().clone()
    }

    /// Power state of the last published snapshot
    pub fn power(&self) -> PowerState {
        self.shared.snapshot.read().power()
    }

    /// Number of open sessions
    pub fn open_count(&self) -> usize {
        self.lifecycle.lock().open_count
    }

    /// Poller lifecycle state
    pub fn poller_state(&self) -> PollerState {
        self.shared.state()
    }

    /// Completed poll cycles since creation
    pub fn cycles(&self) -> u64 {
        self.shared.cycles_completed.load(Ordering::SeqCst)
    }

    /// Add a session.
    ///
    /// The first session starts the poller. Until the first cycle has
    /// completed every acquirer waits for it, at most `timeout`. Returns
    /// whether the first cycle completed in time.
    pub fn acquire(&self, timeout: Duration) -> Result<bool> {
        let waiter = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.open_count == 0 {
                // attach before spawning so the first signal cannot be missed
                let waiter = self.shared.start_waiters.attach();
                self.shared.initialized.store(false, Ordering::SeqCst);
                self.shared.set_state(PollerState::Starting);
                match Poller::spawn(self.shared.clone()) {
                    Ok(poller) => lifecycle.poller = Some(poller),
                    Err(e) => {
                        self.shared.set_state(PollerState::Stopped);
                        tracing::error!("{}: failed to start poller: {}", self.shared.target, e);
                        return Err(e.into());
                    }
                }
                tracing::debug!("{}: poller starting", self.shared.target);
                lifecycle.open_count = 1;
                Some(waiter)
            } else {
                lifecycle.open_count += 1;
                if self.shared.initialized.load(Ordering::SeqCst) {
                    None
                } else {
                    Some(self.shared.start_waiters.attach())
                }
            }
        };

        match waiter {
            None => Ok(true),
            Some(waiter) => {
                if self.shared.initialized.load(Ordering::SeqCst) {
                    return Ok(true);
                }
                waiter.suspend(Some(timeout));
                Ok(self.shared.initialized.load(Ordering::SeqCst))
            }
        }
    }

    /// Remove a session; the last one stops the poller and closes the transport
    pub fn release(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.open_count == 0 {
            tracing::warn!("{}: release without acquire", self.shared.target);
            return;
        }
        lifecycle.open_count -= 1;
        if lifecycle.open_count == 0 {
            if let Some(poller) = lifecycle.poller.take() {
                poller.shutdown(&self.shared);
            }
            tracing::debug!("{}: poller stopped, transport closed", self.shared.target);
        }
    }

    /// Start the next poll cycle without waiting for the interval
    pub fn request_poll(&self) {
        self.shared.poll_gate.signal();
    }

    /// Wait until a poll cycle that started after this call has completed
    pub fn await_cycle(&self, timeout: Duration) -> bool {
        let wanted = self.shared.cycles_started.load(Ordering::SeqCst) + 1;
        let deadline = Instant::now() + timeout;
        loop {
            let waiter = self.shared.status_waiters.attach();
            if self.shared.cycles_completed.load(Ordering::SeqCst) >= wanted {
                return true;
            }
            if self.shared.state() == PollerState::Stopped {
                return false;
            }
            self.request_poll();
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            waiter.suspend(Some(deadline - now));
        }
    }

    /// Wait until `condition` holds for a published snapshot.
    ///
    /// Fails with [`DeviceError::Offline`] as soon as an offline snapshot
    /// is published and with [`DeviceError::Timeout`] after `timeout`.
    pub fn wait_for<F>(&self, timeout: Duration, mut condition: F) -> std::result::Result<D::Snapshot, DeviceError>
    where
        F: FnMut(&D::Snapshot) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let waiter = self.shared.status_waiters.attach();
            {
                let snapshot = self.shared.snapshot.read();
                if condition(&snapshot) {
                    return Ok(snapshot.clone());
                }
                if !snapshot.power().is_reachable() {
                    return Err(DeviceError::Offline);
                }
            }
            if self.shared.state() == PollerState::Stopped {
                return Err(DeviceError::Offline);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DeviceError::timeout(timeout));
            }
            waiter.suspend(Some(deadline - now));
        }
    }
}

impl<D: Dialect> Drop for Connection<D> {
    fn drop(&mut self) {
        if let Some(poller) = self.lifecycle.get_mut().poller.take() {
            poller.shutdown(&self.shared);
        }
    }
}

impl<D: Dialect> std::fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.shared.target)
            .field("dialect", &self.shared.dialect.name())
            .field("state", &self.shared.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::scripted::ScriptedDevice;
    use crate::engine::CommandChannel;
    use possim_core::DeviceEvent;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Echo {
        power: PowerState,
        value: u8,
    }

    impl Snapshot for Echo {
        fn power(&self) -> PowerState {
            self.power
        }

        fn set_power(&mut self, power: PowerState) {
            self.power = power;
        }
    }

    /// Writes `?` and expects one byte back
    struct EchoDialect;

    impl Dialect for EchoDialect {
        type Snapshot = Echo;

        fn name(&self) -> &'static str {
            "echo"
        }

        fn poll(&self, channel: &CommandChannel, next: &mut Echo, _: &mut Vec<DeviceEvent>) -> Result<()> {
            let value = channel.exchange(|transport, timing| {
                transport.write(b"?")?;
                transport.set_timeout(timing.request_timeout)?;
                let data = transport.read(1)?;
                data.first().copied().ok_or_else(|| {
                    possim_core::ProtocolError::NoResponse { attempts: 1 }.into()
                })
            })?;
            next.value = value;
            next.power = PowerState::Online;
            Ok(())
        }

        fn diff(&self, previous: &Echo, current: &Echo, events: &mut Vec<DeviceEvent>) {
            if previous.value != current.value {
                events.push(DeviceEvent::Drawer {
                    open: current.value == b'1',
                });
            }
        }
    }

    fn timing() -> Timing {
        Timing {
            poll_interval: Duration::from_millis(20),
            request_timeout: Duration::from_millis(30),
            max_retry: 1,
            ..Default::default()
        }
    }

    fn connection(device: &ScriptedDevice) -> Connection<EchoDialect> {
        Connection::new(EchoDialect, device.factory(), timing())
    }

    #[test]
    fn test_first_acquire_waits_for_first_cycle() {
        let device = ScriptedDevice::stream("sim");
        device.respond_with(|_| Some(b"0".to_vec()));
        let conn = connection(&device);

        assert_eq!(conn.poller_state(), PollerState::Stopped);
        assert!(conn.acquire(Duration::from_secs(2)).unwrap());
        assert_eq!(conn.power(), PowerState::Online);
        assert_eq!(conn.poller_state(), PollerState::Running);
        assert_eq!(conn.open_count(), 1);

        conn.release();
        assert_eq!(conn.poller_state(), PollerState::Stopped);
        assert!(!device.is_open());
    }

    #[test]
    fn test_release_without_acquire_is_ignored() {
        let device = ScriptedDevice::stream("sim");
        let conn = connection(&device);
        conn.release();
        assert_eq!(conn.open_count(), 0);
    }

    #[test]
    fn test_transport_opened_once_for_many_sessions() {
        let device = ScriptedDevice::stream("sim");
        device.respond_with(|_| Some(b"0".to_vec()));
        let conn = connection(&device);

        assert!(conn.acquire(Duration::from_secs(2)).unwrap());
        assert!(conn.acquire(Duration::from_secs(2)).unwrap());
        assert_eq!(conn.open_count(), 2);
        assert!(conn.await_cycle(Duration::from_secs(2)));
        assert_eq!(device.open_count(), 1);

        conn.release();
        assert_eq!(conn.poller_state(), PollerState::Running);
        assert!(device.is_open());
        conn.release();
        assert_eq!(conn.poller_state(), PollerState::Stopped);
        assert!(!device.is_open());
    }

    #[test]
    fn test_silent_device_acquires_offline() {
        let device = ScriptedDevice::stream("sim");
        device.set_silent(true);
        let conn = connection(&device);

        assert!(conn.acquire(Duration::from_secs(2)).unwrap());
        assert_eq!(conn.power(), PowerState::Offline);
        conn.release();
    }

    #[test]
    fn test_wait_for_sees_change() {
        let device = ScriptedDevice::stream("sim");
        let answer = Arc::new(Mutex::new(b'0'));
        let current = answer.clone();
        device.respond_with(move |_| Some(vec![*current.lock()]));
        let conn = connection(&device);
        assert!(conn.acquire(Duration::from_secs(2)).unwrap());

        *answer.lock() = b'1';
        let snapshot = conn
            .wait_for(Duration::from_secs(2), |s| s.value == b'1')
            .unwrap();
        assert_eq!(snapshot.value, b'1');

        assert_eq!(
            conn.wait_for(Duration::from_millis(50), |s| s.value == b'2'),
            Err(DeviceError::Timeout { timeout_ms: 50 })
        );

        device.set_silent(true);
        assert_eq!(
            conn.wait_for(Duration::from_secs(2), |s| s.value == b'2'),
            Err(DeviceError::Offline)
        );
        conn.release();
    }

    #[test]
    fn test_reacquire_restarts_poller() {
        let device = ScriptedDevice::stream("sim");
        device.respond_with(|_| Some(b"0".to_vec()));
        let conn = connection(&device);

        assert!(conn.acquire(Duration::from_secs(2)).unwrap());
        conn.release();
        assert!(conn.acquire(Duration::from_secs(2)).unwrap());
        assert_eq!(conn.poller_state(), PollerState::Running);
        conn.release();
        assert_eq!(device.open_count(), 2);
        assert_eq!(device.close_count(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn poller_runs_while_sessions_are_open(steps in prop::collection::vec(any::<bool>(), 0..12)) {
            let device = ScriptedDevice::stream("sim");
            device.respond_with(|_| Some(b"0".to_vec()));
            let conn = connection(&device);

            let mut expected = 0usize;
            for acquire in steps {
                if acquire {
                    prop_assert!(conn.acquire(Duration::from_secs(2)).unwrap());
                    expected += 1;
                } else {
                    conn.release();
                    expected = expected.saturating_sub(1);
                }
                prop_assert_eq!(conn.open_count(), expected);
                let want = if expected > 0 { PollerState::Running } else { PollerState::Stopped };
                prop_assert_eq!(conn.poller_state(), want);
            }

            for _ in 0..expected {
                conn.release();
            }
            prop_assert_eq!(conn.open_count(), 0);
            prop_assert_eq!(conn.poller_state(), PollerState::Stopped);
            prop_assert!(!device.is_open());
        }
    }
}
