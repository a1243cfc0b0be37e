//! Connection engine
//!
//! One [`Connection`] per target address. A connection owns the command
//! channel, a background poller thread and the published status
//! snapshot; sessions share it through a [`ConnectionPool`] and reference
//! count it with acquire/release. Protocol details are supplied by a
//! [`Dialect`].

pub mod channel;
pub mod checker;
pub mod connection;
pub mod notifier;
pub mod poller;
pub mod pool;
pub mod session;

pub use channel::CommandChannel;
pub use checker::{CheckResult, CheckerChain, ResponseChecker};
pub use connection::Connection;
pub use poller::PollerState;
pub use pool::ConnectionPool;
pub use session::{CategoryStrategy, DeviceCategory, DeviceSession};

use possim_core::{DeviceEvent, PowerState, Result};
use std::fmt::Debug;
use std::time::Duration;

/// Timing parameters of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause between the start of two poll cycles
    pub poll_interval: Duration,
    /// Budget for one request/response attempt
    pub request_timeout: Duration,
    /// Attempts per request
    pub max_retry: u32,
    /// Read timeout for push dialects
    pub character_timeout: Duration,
    /// Lower bound for a claim's wait on the first cycle
    pub min_claim_timeout: Duration,
    /// Pause before every command write
    pub command_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            request_timeout: Duration::from_millis(1000),
            max_retry: 2,
            character_timeout: Duration::from_millis(50),
            min_claim_timeout: Duration::from_millis(100),
            command_delay: Duration::ZERO,
        }
    }
}

impl Timing {
    /// Worst case until a request is answered or given up
    pub fn response_bound(&self) -> Duration {
        self.request_timeout * self.max_retry.max(1)
    }

    /// Worst case until the first poll cycle completes
    pub fn start_timeout(&self) -> Duration {
        let retries = self.max_retry.max(1);
        self.poll_interval * retries
            + self.response_bound()
            + Duration::from_millis(u64::from(retries))
    }

    /// Attempts per request, at least one
    pub fn attempts(&self) -> u32 {
        self.max_retry.max(1)
    }
}

/// Published per-connection state
pub trait Snapshot: Clone + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Communication state
    fn power(&self) -> PowerState;

    /// Replace the communication state
    fn set_power(&mut self, power: PowerState);
}

/// Device-specific polling protocol
pub trait Dialect: Send + Sync + 'static {
    /// State the dialect publishes after every cycle
    type Snapshot: Snapshot;

    /// Short name for logs and thread names
    fn name(&self) -> &'static str;

    /// Run one status exchange.
    ///
    /// `next` starts as a copy of the published snapshot; on success it
    /// holds the new state including its power state. Input events that
    /// are not state (key presses, touches) go to `inputs`. An error
    /// makes the poller close the channel and publish the connection as
    /// offline.
    fn poll(
        &self,
        channel: &CommandChannel,
        next: &mut Self::Snapshot,
        inputs: &mut Vec<DeviceEvent>,
    ) -> Result<()>;

    /// Sub-state change events between two snapshots; power is handled
    /// by the notifier
    fn diff(
        &self,
        previous: &Self::Snapshot,
        current: &Self::Snapshot,
        events: &mut Vec<DeviceEvent>,
    );

    /// Adjust the snapshot after a failed cycle
    fn on_offline(&self, snapshot: &mut Self::Snapshot) {
        let _ = snapshot;
    }
}
