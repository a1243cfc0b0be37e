//! # Wait Gates
//!
//! Signal/suspend primitives used to correlate application calls with
//! poller progress.
//!
//! - [`WaitGate`]: a single gate; a signal given before `suspend` is kept
//!   until consumed, so no wake-up is lost.
//! - [`WaitList`]: the pending waiters of one condition. Waiters attach
//!   before checking their condition and are dropped from the list once
//!   signalled or once their owner returns.
//!
//! ## Usage
//!
//! ```rust
//! use possim_core::wait::WaitList;
//! use std::time::Duration;
//!
//! let list = WaitList::new();
//! let waiter = list.attach();
//! list.signal_all();
//! assert!(waiter.suspend(Some(Duration::from_millis(10))));
//! ```

mod gate;
mod list;

pub use gate::*;
pub use list::*;
