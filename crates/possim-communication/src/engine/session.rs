//! Device sessions
//!
//! A [`DeviceSession`] is one logical device category (cash drawer,
//! printer, bump bar, ...) on a shared [`Connection`]. Category behavior
//! is a [`CategoryStrategy`]; dialect operations are implemented on the
//! concrete session types in the dialect modules.

use super::{Connection, Dialect};
use parking_lot::Mutex;
use possim_core::{DeviceError, DeviceEvent, EventBus, EventFilter, PowerState, Result, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Device categories multiplexed over the connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    /// Cash drawer
    CashDrawer,
    /// Receipt printer
    PosPrinter,
    /// Kitchen bump bar
    BumpBar,
    /// Remote order display
    RemoteOrderDisplay,
    /// Conveyor belt
    Belt,
    /// Bill acceptor
    BillAcceptor,
    /// Bill dispenser
    BillDispenser,
    /// Cash changer
    CashChanger,
    /// Coin acceptor
    CoinAcceptor,
    /// Coin dispenser
    CoinDispenser,
}

impl DeviceCategory {
    /// Categories that accept cash; one of them may be claimed per cash box
    pub fn is_accepting(self) -> bool {
        matches!(
            self,
            DeviceCategory::BillAcceptor | DeviceCategory::CoinAcceptor | DeviceCategory::CashChanger
        )
    }
}

impl std::fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Per-category behavior of a session
pub trait CategoryStrategy<D: Dialect>: Send + Sync + 'static {
    /// Status as the category reports it
    type Status: Clone + Debug + PartialEq + Send;

    /// Category implemented
    fn category(&self) -> DeviceCategory;

    /// Checks after the connection was acquired; an error undoes the claim
    fn on_claim(&self, connection: &Connection<D>, timeout: Duration) -> Result<()> {
        let _ = (connection, timeout);
        Ok(())
    }

    /// Cleanup before the connection is released
    fn on_release(&self, connection: &Connection<D>) {
        let _ = connection;
    }

    /// Category status from a connection snapshot
    fn decode_status(&self, snapshot: &D::Snapshot) -> Self::Status;

    /// Connection event as this category reports it, `None` if it does not concern it
    fn apply_status(&self, event: &DeviceEvent) -> Option<DeviceEvent>;
}

/// One logical device on a shared connection
pub struct DeviceSession<D: Dialect, S: CategoryStrategy<D>> {
    connection: Arc<Connection<D>>,
    strategy: Arc<S>,
    events: Arc<EventBus>,
    claim: Mutex<Option<SubscriptionId>>,
    power_notify: bool,
}

impl<D: Dialect, S: CategoryStrategy<D>> DeviceSession<D, S> {
    /// Create an unclaimed session
    pub fn new(connection: Arc<Connection<D>>, strategy: S) -> Self {
        Self {
            connection,
            strategy: Arc::new(strategy),
            events: Arc::new(EventBus::new()),
            claim: Mutex::new(None),
            power_notify: false,
        }
    }

    /// Allow claiming while the device is offline; power changes are reported as events
    pub fn with_power_notify(mut self, enabled: bool) -> Self {
        self.power_notify = enabled;
        self
    }

    /// Device category
    pub fn category(&self) -> DeviceCategory {
        self.strategy.category()
    }

    /// Shared connection
    pub fn connection(&self) -> &Arc<Connection<D>> {
        &self.connection
    }

    /// Category strategy
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Events of this category, published on the poller thread
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Whether the session is claimed
    pub fn is_claimed(&self) -> bool {
        self.claim.lock().is_some()
    }

    /// Connection power state
    pub fn power(&self) -> PowerState {
        self.connection.power()
    }

    /// Current category status
    pub fn status(&self) -> S::Status {
        self.strategy.decode_status(&self.connection.snapshot())
    }

    /// Claim the device.
    ///
    /// Acquires the connection, waiting up to `timeout` (default: the
    /// connection's start timeout) for the first poll cycle. Without
    /// power notification an offline device fails the claim.
    pub fn claim(&self, timeout: Option<Duration>) -> Result<()> {
        let mut claim = self.claim.lock();
        if claim.is_some() {
            return Err(DeviceError::illegal("device already claimed").into());
        }

        let timeout = timeout.unwrap_or_else(|| self.connection.timing().start_timeout());
        let strategy = self.strategy.clone();
        let events = self.events.clone();
        let forward = self
            .connection
            .events()
            .subscribe(EventFilter::All, move |event| {
                if let Some(mapped) = strategy.apply_status(event) {
                    events.publish(mapped);
                }
            });

        let claimed = self
            .connection
            .acquire(timeout)
            .and_then(|initialized| {
                if !initialized {
                    tracing::debug!(
                        "{}: first cycle not finished within {:?}",
                        self.connection.target(),
                        timeout
                    );
                }
                let outcome = self
                    .strategy
                    .on_claim(&self.connection, timeout)
                    .and_then(|()| {
                        if self.power_notify || self.connection.power().is_reachable() {
                            Ok(())
                        } else {
                            self.strategy.on_release(&self.connection);
                            Err(DeviceError::Offline.into())
                        }
                    });
                if outcome.is_err() {
                    self.connection.release();
                }
                outcome
            });

        match claimed {
            Ok(()) => {
                *claim = Some(forward);
                tracing::info!("{}: {} claimed", self.connection.target(), self.category());
                Ok(())
            }
            Err(e) => {
                self.connection.events().unsubscribe(forward);
                tracing::warn!(
                    "{}: claiming {} failed: {}",
                    self.connection.target(),
                    self.category(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Release the device; a no-op when not claimed
    pub fn release(&self) {
        let Some(forward) = self.claim.lock().take() else {
            return;
        };
        self.strategy.on_release(&self.connection);
        self.connection.events().unsubscribe(forward);
        self.connection.release();
        tracing::info!("{}: {} released", self.connection.target(), self.category());
    }

    /// Fail with [`DeviceError::NotClaimed`] unless claimed
    pub fn ensure_claimed(&self) -> std::result::Result<(), DeviceError> {
        if self.is_claimed() {
            Ok(())
        } else {
            Err(DeviceError::NotClaimed)
        }
    }

    /// Fail unless claimed and online
    pub fn ensure_online(&self) -> std::result::Result<(), DeviceError> {
        self.ensure_claimed()?;
        if self.connection.power().is_online() {
            Ok(())
        } else {
            Err(DeviceError::Offline)
        }
    }

    /// Map a failed command exchange to the error callers see.
    ///
    /// Communication errors mean the device is gone; the poller is woken
    /// so the offline state is published right away.
    pub(crate) fn command_failed(&self, error: possim_core::Error) -> possim_core::Error {
        if error.is_communication_error() {
            self.connection.request_poll();
            DeviceError::Offline.into()
        } else {
            error
        }
    }
}

impl<D: Dialect, S: CategoryStrategy<D>> Drop for DeviceSession<D, S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<D: Dialect, S: CategoryStrategy<D>> Debug for DeviceSession<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("category", &self.category())
            .field("target", &self.connection.target())
            .field("claimed", &self.is_claimed())
            .finish()
    }
}
