//! Single signal/suspend gate.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Binary gate with a remembered signal.
///
/// `signal` sets the gate; `suspend` blocks until the gate is set or the
/// timeout expires and clears it on return. Signals do not accumulate.
#[derive(Debug, Default)]
pub struct WaitGate {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WaitGate {
    /// Create a new, unsignalled gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gate and wake one suspended thread
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_one();
    }

    /// Block until signalled or until `timeout` elapses.
    ///
    /// `None` waits without limit. Returns true if the gate was signalled.
    pub fn suspend(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut signaled = self.signaled.lock();
        while !*signaled {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut signaled),
            }
        }
        std::mem::replace(&mut *signaled, false)
    }

    /// Drop a pending signal
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Whether a signal is pending
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_signal_before_suspend_is_kept() {
        let gate = WaitGate::new();
        gate.signal();
        assert!(gate.is_signaled());
        assert!(gate.suspend(Some(Duration::from_millis(1))));
        assert!(!gate.is_signaled());
    }

    #[test]
    fn test_suspend_times_out() {
        let gate = WaitGate::new();
        let started = Instant::now();
        assert!(!gate.suspend(Some(Duration::from_millis(30))));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_reset_drops_signal() {
        let gate = WaitGate::new();
        gate.signal();
        gate.reset();
        assert!(!gate.suspend(Some(Duration::from_millis(5))));
    }

    #[test]
    fn test_signal_from_other_thread() {
        let gate = Arc::new(WaitGate::new());
        let signaller = gate.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.signal();
        });
        assert!(gate.suspend(None));
        handle.join().unwrap();
    }

    #[test]
    fn test_signals_do_not_accumulate() {
        let gate = WaitGate::new();
        gate.signal();
        gate.signal();
        assert!(gate.suspend(Some(Duration::from_millis(1))));
        assert!(!gate.suspend(Some(Duration::from_millis(5))));
    }
}
