//! Drawer, belt and cash box behind one UDP controller
//!
//! Requests are `NAME:Function<args>` messages; several are joined with
//! `,` into one datagram and answered in one datagram. Each cycle sends
//! the status commands of every registered [`StatusDecoder`] as one
//! batch, validated by the [`checker_chain`].

pub mod checker;
pub mod session;
pub mod status_parser;

pub use checker::{checker_chain, BeltChecker, CashboxChecker, DrawerChecker};
pub use session::{
    Belt, BeltCategory, BeltStatus, CashCategory, CashDevice, CashStatus, DepositReport,
    UdpCashDrawer, UdpDrawerCategory, UdpDrawerStatus,
};
pub use status_parser::{BeltDecoder, CashboxDecoder, DrawerDecoder, StatusDecoder};

use crate::engine::{CheckerChain, CommandChannel, DeviceCategory, Dialect, Snapshot};
use parking_lot::Mutex;
use possim_core::{
    BeltState, CashEvent, CashScope, CashState, DeviceError, DeviceEvent, PowerState, Result,
    SlotTable,
};

/// Published state of a UDP controller connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdpSnapshot {
    /// Communication state
    pub power: PowerState,
    /// Drawer sensor
    pub drawer_open: bool,
    /// Belt state
    pub belt: BeltState,
    /// Coin slot sensors
    pub coins: CashState,
    /// Bill slot sensors
    pub bills: CashState,
    /// Slot counts
    pub slots: SlotTable,
}

impl UdpSnapshot {
    /// Sensor state of a scope; `All` takes the worse of coins and bills
    pub fn cash(&self, scope: CashScope) -> CashState {
        match scope {
            CashScope::Coins => self.coins,
            CashScope::Bills => self.bills,
            CashScope::All => self.coins.combine(&self.bills),
        }
    }
}

impl Snapshot for UdpSnapshot {
    fn power(&self) -> PowerState {
        self.power
    }

    fn set_power(&mut self, power: PowerState) {
        self.power = power;
    }
}

/// Cash acceptance in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    /// Accepting category that started it
    pub owner: DeviceCategory,
    /// Slots counted
    pub scope: CashScope,
    /// Slot counts when it started
    pub start: SlotTable,
    /// Raise deposit events on slot changes
    pub data_events: bool,
}

/// Status polling and shared cash box state for the UDP controller
pub struct UdpDialect {
    decoders: Vec<Box<dyn StatusDecoder>>,
    checker: CheckerChain,
    accepting: Mutex<Option<DeviceCategory>>,
    deposit: Mutex<Option<Deposit>>,
}

impl UdpDialect {
    /// Dialect polling drawer, belt and cash box
    pub fn new() -> Self {
        Self::with_decoders(vec![
            Box::new(DrawerDecoder),
            Box::new(BeltDecoder),
            Box::new(CashboxDecoder),
        ])
    }

    /// Dialect polling only the given devices
    pub fn with_decoders(decoders: Vec<Box<dyn StatusDecoder>>) -> Self {
        Self {
            decoders,
            checker: checker_chain(),
            accepting: Mutex::new(None),
            deposit: Mutex::new(None),
        }
    }

    /// Checker chain for requests
    pub fn checker(&self) -> &CheckerChain {
        &self.checker
    }

    /// Status commands of one cycle
    pub fn status_commands(&self) -> Vec<String> {
        self.decoders
            .iter()
            .flat_map(|d| d.commands().iter().map(|c| c.to_string()))
            .collect()
    }

    /// Accepting category currently claimed
    pub fn accepting(&self) -> Option<DeviceCategory> {
        *self.accepting.lock()
    }

    /// Running deposit
    pub fn deposit(&self) -> Option<Deposit> {
        self.deposit.lock().clone()
    }

    pub(crate) fn claim_accepting(&self, category: DeviceCategory) -> std::result::Result<(), DeviceError> {
        let mut accepting = self.accepting.lock();
        match *accepting {
            Some(holder) if holder != category => Err(DeviceError::Claimed {
                reason: format!("{} accepts cash", holder),
            }),
            _ => {
                *accepting = Some(category);
                Ok(())
            }
        }
    }

    pub(crate) fn release_accepting(&self, category: DeviceCategory) {
        let mut accepting = self.accepting.lock();
        if *accepting == Some(category) {
            *accepting = None;
        }
        let mut deposit = self.deposit.lock();
        if deposit.as_ref().is_some_and(|d| d.owner == category) {
            *deposit = None;
        }
    }

    pub(crate) fn start_deposit(&self, deposit: Deposit) -> std::result::Result<(), DeviceError> {
        let mut current = self.deposit.lock();
        if current.is_some() {
            return Err(DeviceError::illegal("deposit already running"));
        }
        *current = Some(deposit);
        Ok(())
    }

    pub(crate) fn stop_deposit_events(&self) {
        if let Some(deposit) = self.deposit.lock().as_mut() {
            deposit.data_events = false;
        }
    }

    pub(crate) fn finish_deposit(&self) -> Option<Deposit> {
        self.deposit.lock().take()
    }
}

impl Default for UdpDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UdpDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpDialect")
            .field("decoders", &self.decoders.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("accepting", &self.accepting())
            .finish()
    }
}

impl Dialect for UdpDialect {
    type Snapshot = UdpSnapshot;

    fn name(&self) -> &'static str {
        "udp"
    }

    fn poll(&self, channel: &CommandChannel, next: &mut UdpSnapshot, _inputs: &mut Vec<DeviceEvent>) -> Result<()> {
        let commands = self.status_commands();
        let values = channel.send_and_await(&commands, &self.checker)?;
        let mut rest = values.as_slice();
        for decoder in &self.decoders {
            let (mine, others) = rest.split_at(decoder.commands().len().min(rest.len()));
            decoder.apply(mine, next)?;
            rest = others;
        }
        next.power = PowerState::Online;
        Ok(())
    }

    fn diff(&self, previous: &UdpSnapshot, current: &UdpSnapshot, events: &mut Vec<DeviceEvent>) {
        for decoder in &self.decoders {
            decoder.diff(previous, current, events);
        }
        if previous.slots == current.slots {
            return;
        }
        if let Some(deposit) = self.deposit.lock().as_ref().filter(|d| d.data_events) {
            let delta = current.slots.delta(&deposit.start);
            events.push(DeviceEvent::Cash(CashEvent::Deposit {
                scope: deposit.scope,
                amount: delta.amount(deposit.scope),
                counts: delta.counts(deposit.scope),
            }));
        }
    }
}
