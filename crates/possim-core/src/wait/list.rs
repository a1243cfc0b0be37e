//! Pending wait list with attach/release bracketing.

use super::gate::WaitGate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Set of gates registered by callers blocked on one condition.
#[derive(Debug, Default)]
pub struct WaitList {
    gates: Mutex<Vec<(u64, Arc<WaitGate>)>>,
    next_id: AtomicU64,
}

impl WaitList {
    /// Create an empty wait list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new gate. The returned waiter releases it on drop.
    pub fn attach(&self) -> Waiter<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(WaitGate::new());
        self.gates.lock().push((id, gate.clone()));
        Waiter {
            list: self,
            id,
            gate,
        }
    }

    /// Signal every registered gate and empty the list.
    ///
    /// Returns the number of waiters woken.
    pub fn signal_all(&self) -> usize {
        let gates = std::mem::take(&mut *self.gates.lock());
        for (_, gate) in &gates {
            gate.signal();
        }
        gates.len()
    }

    /// Number of attached waiters
    pub fn len(&self) -> usize {
        self.gates.lock().len()
    }

    /// Whether no waiter is attached
    pub fn is_empty(&self) -> bool {
        self.gates.lock().is_empty()
    }

    fn release(&self, id: u64) {
        self.gates.lock().retain(|(gate_id, _)| *gate_id != id);
    }
}

/// A gate attached to a [`WaitList`]
#[derive(Debug)]
pub struct Waiter<'a> {
    list: &'a WaitList,
    id: u64,
    gate: Arc<WaitGate>,
}

impl Waiter<'_> {
    /// Block until the list signals this waiter or `timeout` elapses
    pub fn suspend(&self, timeout: Option<Duration>) -> bool {
        self.gate.suspend(timeout)
    }

    /// Whether the list already signalled this waiter
    pub fn is_signaled(&self) -> bool {
        self.gate.is_signaled()
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.list.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_attach_and_release() {
        let list = WaitList::new();
        {
            let _a = list.attach();
            let _b = list.attach();
            assert_eq!(list.len(), 2);
        }
        assert!(list.is_empty());
    }

    #[test]
    fn test_signal_all_wakes_every_waiter() {
        let list = Arc::new(WaitList::new());
        let mut handles = Vec::new();
        let ready = Arc::new(std::sync::Barrier::new(4));

        for _ in 0..3 {
            let list = list.clone();
            let ready = ready.clone();
            handles.push(thread::spawn(move || {
                let waiter = list.attach();
                ready.wait();
                waiter.suspend(Some(Duration::from_secs(5)))
            }));
        }

        ready.wait();
        assert_eq!(list.signal_all(), 3);
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_signalled_waiter_is_removed() {
        let list = WaitList::new();
        let waiter = list.attach();
        list.signal_all();
        assert!(list.is_empty());
        assert!(waiter.is_signaled());
        // a second broadcast must not reach the stale waiter
        assert_eq!(list.signal_all(), 0);
        assert!(waiter.suspend(Some(Duration::from_millis(1))));
        assert!(!waiter.suspend(Some(Duration::from_millis(1))));
    }
}
