//! Drawer, belt and cash categories of the UDP controller

use super::status_parser::{format_slot_pairs, parse_belt, parse_slots};
use super::{Deposit, UdpDialect, UdpSnapshot};
use crate::engine::{CategoryStrategy, Connection, DeviceCategory, DeviceSession};
use possim_core::{
    BeltSpeed, BeltState, CashEvent, CashOperation, CashScope, CashSlot, CashState, DeviceError,
    DeviceEvent, MotorState, PowerState, ProtocolError, Result, SlotTable,
};
use std::time::{Duration, Instant};

/// Cash drawer session on a UDP controller
pub type UdpCashDrawer = DeviceSession<UdpDialect, UdpDrawerCategory>;

/// Belt session
pub type Belt = DeviceSession<UdpDialect, BeltCategory>;

/// Acceptor, dispenser or changer session
pub type CashDevice = DeviceSession<UdpDialect, CashCategory>;

fn parse_amount(value: &str) -> std::result::Result<i64, ProtocolError> {
    value.trim().parse().map_err(|_| ProtocolError::InvalidValue {
        field: "amount",
        value: value.to_string(),
    })
}

impl<S: CategoryStrategy<UdpDialect>> DeviceSession<UdpDialect, S> {
    /// Send `commands` as one request and return the response values in order
    pub fn request(&self, commands: &[&str]) -> Result<Vec<String>> {
        self.request_until(commands, self.deadline())
    }

    /// Snapshot of a poll cycle started after this call
    pub fn fresh_snapshot(&self) -> Result<UdpSnapshot> {
        self.snapshot_until(self.deadline())
    }

    /// End of the response bound, taken once when an operation starts
    fn deadline(&self) -> Instant {
        Instant::now() + self.connection().timing().response_bound()
    }

    /// Time left until `deadline`; an exhausted budget is a timeout
    fn remaining(&self, deadline: Instant) -> std::result::Result<Duration, DeviceError> {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            Err(DeviceError::timeout(self.connection().timing().response_bound()))
        } else {
            Ok(left)
        }
    }

    fn request_until(&self, commands: &[&str], deadline: Instant) -> Result<Vec<String>> {
        self.ensure_online()?;
        self.remaining(deadline)?;
        let commands: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
        let connection = self.connection();
        connection
            .channel()
            .send_and_await_until(&commands, connection.dialect().checker(), deadline)
            .map_err(|e| self.command_failed(e))
    }

    fn snapshot_until(&self, deadline: Instant) -> Result<UdpSnapshot> {
        let connection = self.connection();
        if !connection.await_cycle(self.remaining(deadline)?) {
            return Err(DeviceError::timeout(connection.timing().response_bound()).into());
        }
        let snapshot = connection.snapshot();
        if !snapshot.power.is_online() {
            return Err(DeviceError::Offline.into());
        }
        Ok(snapshot)
    }
}

/// Cash drawer status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpDrawerStatus {
    /// Connection power state
    pub power: PowerState,
    /// Drawer sensor
    pub open: bool,
}

/// Cash drawer category
#[derive(Debug, Default)]
pub struct UdpDrawerCategory;

impl CategoryStrategy<UdpDialect> for UdpDrawerCategory {
    type Status = UdpDrawerStatus;

    fn category(&self) -> DeviceCategory {
        DeviceCategory::CashDrawer
    }

    fn decode_status(&self, snapshot: &UdpSnapshot) -> UdpDrawerStatus {
        UdpDrawerStatus {
            power: snapshot.power,
            open: snapshot.drawer_open,
        }
    }

    fn apply_status(&self, event: &DeviceEvent) -> Option<DeviceEvent> {
        match event {
            DeviceEvent::Power { .. } | DeviceEvent::Drawer { .. } => Some(event.clone()),
            _ => None,
        }
    }
}

impl DeviceSession<UdpDialect, UdpDrawerCategory> {
    /// Whether the drawer is open
    pub fn is_drawer_open(&self) -> bool {
        self.status().open
    }

    /// Open the drawer and wait until a poll reports it open
    pub fn open_drawer(&self) -> Result<()> {
        let deadline = self.deadline();
        self.request_until(&["DRAWER:Open"], deadline)?;
        let connection = self.connection();
        connection.request_poll();
        connection.wait_for(self.remaining(deadline)?, |s| s.drawer_open)?;
        Ok(())
    }

    /// Block until the drawer is closed
    pub fn wait_for_drawer_close(&self, timeout: Duration) -> Result<()> {
        self.ensure_claimed()?;
        self.connection().wait_for(timeout, |s| !s.drawer_open)?;
        Ok(())
    }
}

/// Belt status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeltStatus {
    /// Connection power state
    pub power: PowerState,
    /// Belt state
    pub belt: BeltState,
}

/// Belt category
#[derive(Debug, Default)]
pub struct BeltCategory;

impl CategoryStrategy<UdpDialect> for BeltCategory {
    type Status = BeltStatus;

    fn category(&self) -> DeviceCategory {
        DeviceCategory::Belt
    }

    fn decode_status(&self, snapshot: &UdpSnapshot) -> BeltStatus {
        BeltStatus {
            power: snapshot.power,
            belt: snapshot.belt,
        }
    }

    fn apply_status(&self, event: &DeviceEvent) -> Option<DeviceEvent> {
        match event {
            DeviceEvent::Power { .. } | DeviceEvent::Belt(_) => Some(event.clone()),
            _ => None,
        }
    }
}

impl DeviceSession<UdpDialect, BeltCategory> {
    fn ensure_operational(&self) -> std::result::Result<BeltState, DeviceError> {
        self.ensure_online()?;
        let belt = self.status().belt;
        if belt.motor != MotorState::Ok || belt.flap_open {
            return Err(DeviceError::failure("belt hardware not operational"));
        }
        Ok(belt)
    }

    fn set_speed(&self, speed: BeltSpeed) -> Result<()> {
        let digit = match speed {
            BeltSpeed::Off => 0,
            BeltSpeed::Slow => 1,
            BeltSpeed::Fast => 2,
        };
        let deadline = self.deadline();
        let command = format!("BELT:Speed{}", digit);
        let values = self.request_until(&[command.as_str()], deadline)?;
        let reported = parse_belt(&values[0])?;
        let connection = self.connection();
        connection.request_poll();
        if reported.speed != speed {
            return Err(DeviceError::failure(format!("belt speed {:?} not accepted", speed)).into());
        }
        connection
            .wait_for(self.remaining(deadline)?, |s| s.belt.speed == speed)
            .map_err(|e| match e {
                DeviceError::Timeout { .. } => {
                    DeviceError::failure(format!("belt speed {:?} not reached", speed))
                }
                other => other,
            })?;
        Ok(())
    }

    /// Move the belt forward at `speed`
    pub fn move_forward(&self, speed: BeltSpeed) -> Result<()> {
        let belt = self.ensure_operational()?;
        if speed == BeltSpeed::Off {
            return Err(DeviceError::illegal("use stop() to stop the belt").into());
        }
        if belt.barrier_interrupted {
            return Err(DeviceError::illegal("light barrier interrupted").into());
        }
        self.set_speed(speed)
    }

    /// Stop the belt
    pub fn stop(&self) -> Result<()> {
        self.ensure_operational()?;
        self.set_speed(BeltSpeed::Off)
    }
}

/// Status of a cash category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashStatus {
    /// Connection power state
    pub power: PowerState,
    /// Sensors of the category's slots
    pub state: CashState,
    /// Slot counts
    pub slots: SlotTable,
}

/// Amount and counts of a deposit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReport {
    /// Deposited amount in minimum currency units
    pub amount: i64,
    /// Deposited pieces in `value:count` notation
    pub counts: String,
}

/// Acceptor, dispenser and changer categories of the cash box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CashCategory {
    category: DeviceCategory,
    scope: CashScope,
}

impl CashCategory {
    /// Bill acceptor
    pub fn bill_acceptor() -> Self {
        Self {
            category: DeviceCategory::BillAcceptor,
            scope: CashScope::Bills,
        }
    }

    /// Coin acceptor
    pub fn coin_acceptor() -> Self {
        Self {
            category: DeviceCategory::CoinAcceptor,
            scope: CashScope::Coins,
        }
    }

    /// Cash changer, coins and bills
    pub fn cash_changer() -> Self {
        Self {
            category: DeviceCategory::CashChanger,
            scope: CashScope::All,
        }
    }

    /// Bill dispenser
    pub fn bill_dispenser() -> Self {
        Self {
            category: DeviceCategory::BillDispenser,
            scope: CashScope::Bills,
        }
    }

    /// Coin dispenser
    pub fn coin_dispenser() -> Self {
        Self {
            category: DeviceCategory::CoinDispenser,
            scope: CashScope::Coins,
        }
    }

    /// Slots the category handles
    pub fn scope(&self) -> CashScope {
        self.scope
    }

    /// Whether the category takes cash in
    pub fn is_accepting(&self) -> bool {
        self.category.is_accepting()
    }

    /// Whether the category pays cash out
    pub fn is_dispensing(&self) -> bool {
        matches!(
            self.category,
            DeviceCategory::BillDispenser | DeviceCategory::CoinDispenser | DeviceCategory::CashChanger
        )
    }

    /// Argument of `StartInput`
    fn input_kind(&self) -> u8 {
        match self.scope {
            CashScope::Coins => 1,
            CashScope::Bills => 2,
            CashScope::All => 3,
        }
    }

    /// Letter of `Output`
    fn output_kind(&self) -> char {
        match self.scope {
            CashScope::Coins => 'C',
            CashScope::Bills => 'B',
            CashScope::All => 'A',
        }
    }
}

impl CategoryStrategy<UdpDialect> for CashCategory {
    type Status = CashStatus;

    fn category(&self) -> DeviceCategory {
        self.category
    }

    fn on_claim(&self, connection: &Connection<UdpDialect>, _timeout: Duration) -> Result<()> {
        if self.is_accepting() {
            connection.dialect().claim_accepting(self.category)?;
        }
        Ok(())
    }

    fn on_release(&self, connection: &Connection<UdpDialect>) {
        if self.is_accepting() {
            connection.dialect().release_accepting(self.category);
        }
    }

    fn decode_status(&self, snapshot: &UdpSnapshot) -> CashStatus {
        CashStatus {
            power: snapshot.power,
            state: snapshot.cash(self.scope),
            slots: snapshot.slots.clone(),
        }
    }

    fn apply_status(&self, event: &DeviceEvent) -> Option<DeviceEvent> {
        let mine = match event {
            DeviceEvent::Power { .. } | DeviceEvent::Cash(CashEvent::Jam { .. }) => true,
            DeviceEvent::Cash(CashEvent::Full { scope, .. }) => {
                *scope == self.scope && (self.is_accepting() || self.category == DeviceCategory::CashChanger)
            }
            DeviceEvent::Cash(CashEvent::Empty { scope, .. }) => *scope == self.scope && self.is_dispensing(),
            DeviceEvent::Cash(CashEvent::Deposit { scope, .. }) => *scope == self.scope && self.is_accepting(),
            _ => false,
        };
        mine.then(|| event.clone())
    }
}

/// Parse `value:count` lists, coins before the `;` and bills after it.
///
/// Slots not listed count zero. Only the parts of `scope` may be given.
pub fn parse_cash_counts(counts: &str, scope: CashScope) -> std::result::Result<SlotTable, DeviceError> {
    let mut parts = counts.splitn(2, ';');
    let coins = parts.next().unwrap_or_default();
    let bills = parts.next().unwrap_or_default();
    match scope {
        CashScope::Coins if !bills.is_empty() => {
            return Err(DeviceError::illegal(format!("{} lists bills", counts)))
        }
        CashScope::Bills if !coins.is_empty() => {
            return Err(DeviceError::illegal(format!("{} lists coins", counts)))
        }
        _ => {}
    }

    let mut slots = SlotTable::default().slots().to_vec();
    for (part, part_scope) in [(coins, CashScope::Coins), (bills, CashScope::Bills)] {
        for entry in part.split(',').filter(|e| !e.is_empty()) {
            let parsed = entry
                .split_once(':')
                .and_then(|(v, c)| Some((v.trim().parse::<u32>().ok()?, c.trim().parse::<i64>().ok()?)));
            let Some((value, count)) = parsed else {
                return Err(DeviceError::illegal(format!("invalid cash count {}", entry)));
            };
            let range = part_scope.slot_range();
            let Some(slot) = slots[range].iter_mut().find(|s| s.value == value) else {
                return Err(DeviceError::illegal(format!("invalid cash count {}", entry)));
            };
            slot.count += count;
        }
    }
    Ok(SlotTable::from_slots(slots))
}

/// Whether `amount` can be paid from `slots`, largest denomination first
fn can_dispense(slots: &[CashSlot], amount: i64) -> bool {
    let rest = slots.iter().rev().fold(amount, |rest, slot| {
        let value = i64::from(slot.value);
        if value == 0 || value > rest {
            return rest;
        }
        rest - (rest / value).min(slot.count.max(0)) * value
    });
    rest == 0
}

impl DeviceSession<UdpDialect, CashCategory> {
    fn require_accepting(&self) -> std::result::Result<(), DeviceError> {
        self.ensure_claimed()?;
        if self.strategy().is_accepting() {
            Ok(())
        } else {
            Err(DeviceError::illegal(format!("{} does not accept cash", self.category())))
        }
    }

    fn require_dispensing(&self) -> std::result::Result<(), DeviceError> {
        self.ensure_claimed()?;
        if self.strategy().is_dispensing() {
            Ok(())
        } else {
            Err(DeviceError::illegal(format!("{} does not dispense cash", self.category())))
        }
    }

    fn own_deposit(&self) -> std::result::Result<Deposit, DeviceError> {
        self.connection()
            .dialect()
            .deposit()
            .filter(|d| d.owner == self.category())
            .ok_or_else(|| DeviceError::illegal("no deposit running"))
    }

    fn ensure_no_deposit(&self) -> std::result::Result<(), DeviceError> {
        if self.connection().dialect().deposit().is_some() {
            Err(DeviceError::illegal("cash acceptance in progress"))
        } else {
            Ok(())
        }
    }

    fn deposit_report(&self, slots: &SlotTable, deposit: &Deposit) -> DepositReport {
        let delta = slots.delta(&deposit.start);
        DepositReport {
            amount: delta.amount(deposit.scope),
            counts: delta.counts(deposit.scope),
        }
    }

    /// Start accepting cash; `data_events` raises a deposit event on every slot change
    pub fn begin_deposit(&self, data_events: bool) -> Result<()> {
        self.require_accepting()?;
        self.ensure_no_deposit()?;
        let start_input = format!("CASHBOX:StartInput{}", self.strategy().input_kind());
        let values = self.request_until(&[start_input.as_str(), "CASHBOX:GetSlots"], self.deadline())?;
        let start = parse_slots(&values[1])?;
        self.connection().dialect().start_deposit(Deposit {
            owner: self.category(),
            scope: self.strategy().scope(),
            start,
            data_events,
        })?;
        self.connection().request_poll();
        tracing::debug!("{}: {} deposit started", self.connection().target(), self.category());
        Ok(())
    }

    /// Stop accepting cash and check the device total against the counted slots
    pub fn fix_deposit(&self) -> Result<DepositReport> {
        self.require_accepting()?;
        let deposit = self.own_deposit()?;
        let deadline = self.deadline();
        let values = self.request_until(&["CASHBOX:StopInput"], deadline)?;
        let reported = parse_amount(&values[0])?;
        let snapshot = self.snapshot_until(deadline)?;
        let report = self.deposit_report(&snapshot.slots, &deposit);
        if reported != report.amount {
            return Err(DeviceError::failure(format!(
                "deposit amount mismatch: device {}, slots {}",
                reported, report.amount
            ))
            .into());
        }
        self.connection().dialect().stop_deposit_events();
        Ok(report)
    }

    /// Finish the deposit
    pub fn end_deposit(&self) -> Result<DepositReport> {
        self.require_accepting()?;
        let deposit = self.own_deposit()?;
        let deadline = self.deadline();
        let values = self.request_until(&["CASHBOX:EndInput"], deadline)?;
        let reported = parse_amount(&values[0])?;
        let snapshot = self.snapshot_until(deadline)?;
        let report = self.deposit_report(&snapshot.slots, &deposit);
        if reported != report.amount {
            return Err(DeviceError::failure(format!(
                "deposit amount mismatch: device {}, slots {}",
                reported, report.amount
            ))
            .into());
        }
        self.connection().dialect().finish_deposit();
        Ok(report)
    }

    /// Cancel a running cash input; the device restores the slots
    pub fn clear_input(&self) -> Result<()> {
        self.require_accepting()?;
        self.ensure_online()?;
        let pending = |operation: CashOperation| matches!(operation, CashOperation::Input | CashOperation::FinishInput);
        if self.own_deposit().is_ok() || pending(self.status().state.operation) {
            let deadline = self.deadline();
            self.request_until(&["CASHBOX:CancelInput"], deadline)?;
            if pending(self.snapshot_until(deadline)?.cash(self.strategy().scope()).operation) {
                return Err(DeviceError::failure("unable to cancel deposit").into());
            }
        }
        self.connection().dialect().finish_deposit();
        Ok(())
    }

    /// Slot counts of the category in `value:count` notation.
    ///
    /// During a deposit the counts from before the deposit are reported.
    pub fn read_cash_counts(&self) -> Result<String> {
        self.ensure_online()?;
        let snapshot = self.fresh_snapshot()?;
        let scope = self.strategy().scope();
        Ok(match self.connection().dialect().deposit() {
            Some(deposit) => deposit.start.counts(scope),
            None => snapshot.slots.counts(scope),
        })
    }

    /// Set slot counts; only the slots that change are sent
    pub fn adjust_cash_counts(&self, counts: &str) -> Result<()> {
        self.ensure_online()?;
        self.ensure_no_deposit()?;
        let scope = self.strategy().scope();
        let target = parse_cash_counts(counts, scope)?;
        let current = self.status().slots;
        let changes: Vec<CashSlot> = target
            .scope(scope)
            .iter()
            .zip(current.scope(scope))
            .filter(|(want, have)| want.count != have.count)
            .map(|(want, have)| CashSlot {
                value: want.value,
                count: want.count - have.count,
            })
            .collect();
        if changes.is_empty() {
            return Ok(());
        }
        let deadline = self.deadline();
        let command = format!("CASHBOX:AddSlots {}", format_slot_pairs(&changes));
        self.request_until(&[command.as_str()], deadline)?;
        self.snapshot_until(deadline)?;
        Ok(())
    }

    /// Pay out `amount` minimum currency units
    pub fn dispense_change(&self, amount: i64) -> Result<()> {
        self.require_dispensing()?;
        self.ensure_online()?;
        self.ensure_no_deposit()?;
        if amount <= 0 {
            return Err(DeviceError::illegal(format!("cannot dispense {}", amount)).into());
        }
        let status = self.status();
        if status.state.operation != CashOperation::Idle {
            return Err(DeviceError::failure("cash box not operational").into());
        }
        if !can_dispense(status.slots.scope(self.strategy().scope()), amount) {
            return Err(DeviceError::illegal(format!("cannot dispense {} from the slots", amount)).into());
        }
        let command = format!("CASHBOX:Output{}{}", self.strategy().output_kind(), amount);
        let values = self.request(&[command.as_str()])?;
        let dispensed = parse_amount(&values[0])?;
        self.connection().request_poll();
        if dispensed != amount {
            return Err(DeviceError::failure(format!("dispensed {} of {}", dispensed, amount)).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use possim_core::{EmptyLevel, FullLevel};

    #[test]
    fn test_parse_cash_counts() {
        let table = parse_cash_counts("1:5,50:2;500:1", CashScope::All).unwrap();
        assert_eq!(table.count_of(1), Some(5));
        assert_eq!(table.count_of(50), Some(2));
        assert_eq!(table.count_of(500), Some(1));
        assert_eq!(table.count_of(2), Some(0));

        assert!(parse_cash_counts("1:5;500:1", CashScope::Coins).is_err());
        assert!(parse_cash_counts("1:5", CashScope::Bills).is_err());
        assert!(parse_cash_counts(";500:1", CashScope::Bills).is_ok());
        assert!(parse_cash_counts("500:1", CashScope::Coins).is_err());
        assert!(parse_cash_counts("3:1", CashScope::Coins).is_err());
        assert!(parse_cash_counts("1:x", CashScope::Coins).is_err());
    }

    #[test]
    fn test_can_dispense() {
        let slots = [
            CashSlot { value: 1, count: 2 },
            CashSlot { value: 5, count: 1 },
            CashSlot { value: 10, count: 3 },
        ];
        assert!(can_dispense(&slots, 37));
        assert!(can_dispense(&slots, 7));
        assert!(!can_dispense(&slots, 38));
        assert!(!can_dispense(&slots, 4));
    }

    #[test]
    fn test_cash_category_event_routing() {
        let full_bills = DeviceEvent::Cash(CashEvent::Full {
            scope: CashScope::Bills,
            level: FullLevel::Full,
        });
        let empty_coins = DeviceEvent::Cash(CashEvent::Empty {
            scope: CashScope::Coins,
            level: EmptyLevel::Empty,
        });
        let jam = DeviceEvent::Cash(CashEvent::Jam { jammed: true });

        assert!(CashCategory::bill_acceptor().apply_status(&full_bills).is_some());
        assert!(CashCategory::bill_dispenser().apply_status(&full_bills).is_none());
        assert!(CashCategory::coin_dispenser().apply_status(&empty_coins).is_some());
        assert!(CashCategory::coin_acceptor().apply_status(&empty_coins).is_none());
        assert!(CashCategory::cash_changer().apply_status(&full_bills).is_none());
        assert!(CashCategory::coin_dispenser().apply_status(&jam).is_some());
        assert!(UdpDrawerCategory.apply_status(&jam).is_none());
    }

    #[test]
    fn test_category_kinds() {
        assert!(CashCategory::cash_changer().is_accepting());
        assert!(CashCategory::cash_changer().is_dispensing());
        assert!(!CashCategory::bill_dispenser().is_accepting());
        assert_eq!(CashCategory::coin_acceptor().input_kind(), 1);
        assert_eq!(CashCategory::bill_dispenser().output_kind(), 'B');
    }
}
