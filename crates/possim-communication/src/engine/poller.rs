//! Background poll loop of a connection

use super::connection::Shared;
use super::notifier::notify;
use super::{Dialect, Snapshot};
use possim_core::PowerState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Lifecycle of the poller thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PollerState {
    /// No thread
    Stopped = 0,
    /// Thread running, first cycle not finished
    Starting = 1,
    /// First cycle finished
    Running = 2,
    /// Stop requested
    Stopping = 3,
}

impl PollerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PollerState::Starting,
            2 => PollerState::Running,
            3 => PollerState::Stopping,
            _ => PollerState::Stopped,
        }
    }
}

/// Handle to a running poller thread
pub(crate) struct Poller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub(crate) fn spawn<D: Dialect>(shared: Arc<Shared<D>>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(format!("poll-{}", shared.dialect.name()))
            .spawn(move || run(shared, thread_stop))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the loop, join the thread and close the channel
    pub(crate) fn shutdown<D: Dialect>(mut self, shared: &Shared<D>) {
        shared.set_state(PollerState::Stopping);
        self.stop.store(true, Ordering::SeqCst);
        shared.poll_gate.signal();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("{}: poller thread panicked", shared.target);
            }
        }
        shared.channel.close();
        shared.set_state(PollerState::Stopped);
        shared.start_waiters.signal_all();
        shared.status_waiters.signal_all();
    }
}

fn run<D: Dialect>(shared: Arc<Shared<D>>, stop: Arc<AtomicBool>) {
    tracing::debug!("{}: {} poller started", shared.target, shared.dialect.name());

    while !stop.load(Ordering::SeqCst) {
        let began = Instant::now();
        cycle(&shared);

        if !shared.initialized.swap(true, Ordering::SeqCst) {
            shared.set_state(PollerState::Running);
            shared.start_waiters.signal_all();
        }
        shared.status_waiters.signal_all();

        let elapsed = began.elapsed();
        if elapsed < shared.timing.poll_interval && !stop.load(Ordering::SeqCst) {
            // request_poll and shutdown cut the pause short
            shared.poll_gate.suspend(Some(shared.timing.poll_interval - elapsed));
        }
    }

    shared.channel.close();
    tracing::debug!("{}: poller stopped", shared.target);
}

fn cycle<D: Dialect>(shared: &Shared<D>) {
    shared.cycles_started.fetch_add(1, Ordering::SeqCst);

    let previous = shared.snapshot.read().clone();
    let mut next = previous.clone();
    let mut inputs = Vec::new();

    if let Err(e) = shared.dialect.poll(&shared.channel, &mut next, &mut inputs) {
        if previous.power().is_reachable() {
            tracing::warn!("{}: device offline: {}", shared.target, e);
        } else {
            tracing::trace!("{}: still offline: {}", shared.target, e);
        }
        shared.channel.close();
        next = previous.clone();
        shared.dialect.on_offline(&mut next);
        next.set_power(PowerState::Offline);
    } else if previous.power() != next.power() {
        tracing::info!("{}: device {}", shared.target, next.power());
    }

    let events = notify(&shared.dialect, &previous, &next, inputs);
    *shared.snapshot.write() = next;
    shared.cycles_completed.fetch_add(1, Ordering::SeqCst);
    shared.events.publish_all(events);
}
