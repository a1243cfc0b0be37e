//! Status values of the UDP controller
//!
//! | command | value |
//! |---------|-------|
//! | `DRAWER:GetState` | `0` closed, `1` open |
//! | `BELT:GetState` | `WXYZ`: speed 0-2, motor 0-2 (ok, overheated, defective), flap 0-1, light barrier 0-1 |
//! | `CASHBOX:GetState` | `NMO`: empty 0-2, full 0-2 (worst first), operation 0-4 |
//! | `CASHBOX:GetSlots` | space separated `value count` pairs, one per slot |

use super::UdpSnapshot;
use possim_core::{
    BeltEvent, BeltSpeed, BeltState, CashEvent, CashOperation, CashScope, CashSlot, CashState,
    DeviceEvent, EmptyLevel, FullLevel, MotorState, ProtocolError, SlotTable, BILL_INDEX,
};

/// Count at or below which a slot is nearly empty
pub const NEAR_EMPTY_COUNT: i64 = 2;

/// Count at or above which a slot is nearly full
pub const NEAR_FULL_COUNT: i64 = 98;

/// Count of a full slot
pub const FULL_COUNT: i64 = 100;

/// Contributes status requests to the poll batch and decodes their values
pub trait StatusDecoder: Send + Sync {
    /// Device name
    fn name(&self) -> &'static str;

    /// Status commands sent every cycle
    fn commands(&self) -> &'static [&'static str];

    /// Apply the values answering [`commands`](Self::commands), in order
    fn apply(&self, values: &[String], snapshot: &mut UdpSnapshot) -> Result<(), ProtocolError>;

    /// Events for the part of the snapshot this decoder owns
    fn diff(&self, previous: &UdpSnapshot, current: &UdpSnapshot, events: &mut Vec<DeviceEvent>);
}

fn invalid(field: &'static str, value: &str) -> ProtocolError {
    ProtocolError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

fn digit(value: &str, index: usize, max: u8, field: &'static str) -> Result<u8, ProtocolError> {
    match value.as_bytes().get(index) {
        Some(&c) if (b'0'..=b'0' + max).contains(&c) => Ok(c - b'0'),
        _ => Err(invalid(field, value)),
    }
}

/// Drawer sensor from `0`/`1`
pub fn parse_drawer(value: &str) -> Result<bool, ProtocolError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(invalid("drawer state", value)),
    }
}

/// Belt state from `WXYZ`
pub fn parse_belt(value: &str) -> Result<BeltState, ProtocolError> {
    if value.len() != 4 {
        return Err(invalid("belt state", value));
    }
    let speed = match digit(value, 0, 2, "belt speed")? {
        0 => BeltSpeed::Off,
        1 => BeltSpeed::Slow,
        _ => BeltSpeed::Fast,
    };
    let motor = match digit(value, 1, 2, "belt motor")? {
        0 => MotorState::Ok,
        1 => MotorState::Overheated,
        _ => MotorState::Defective,
    };
    Ok(BeltState {
        speed,
        motor,
        flap_open: digit(value, 2, 1, "belt flap")? == 1,
        barrier_interrupted: digit(value, 3, 1, "belt light barrier")? == 1,
    })
}

/// Raw cash box state from `NMO`
pub fn parse_cash_state(value: &str) -> Result<CashState, ProtocolError> {
    if value.len() != 3 {
        return Err(invalid("cash state", value));
    }
    let empty = match digit(value, 0, 2, "cash empty state")? {
        0 => EmptyLevel::Empty,
        1 => EmptyLevel::NearEmpty,
        _ => EmptyLevel::Ok,
    };
    let full = match digit(value, 1, 2, "cash full state")? {
        0 => FullLevel::Full,
        1 => FullLevel::NearFull,
        _ => FullLevel::Ok,
    };
    let operation = match digit(value, 2, 4, "cash operation")? {
        0 => CashOperation::Idle,
        1 => CashOperation::Input,
        2 => CashOperation::FinishInput,
        3 => CashOperation::Jam,
        _ => CashOperation::Opened,
    };
    Ok(CashState {
        empty,
        full,
        operation,
    })
}

/// Space separated `value count` pairs; `None` if any token is not a number
pub fn parse_slot_pairs(text: &str) -> Option<Vec<CashSlot>> {
    let numbers = text
        .split_whitespace()
        .map(str::parse::<i64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    if numbers.len() % 2 != 0 {
        return None;
    }
    numbers
        .chunks(2)
        .map(|pair| {
            Some(CashSlot {
                value: u32::try_from(pair[0]).ok()?,
                count: pair[1],
            })
        })
        .collect()
}

/// `value count` pairs as sent in `AddSlots`
pub fn format_slot_pairs(slots: &[CashSlot]) -> String {
    slots
        .iter()
        .map(|s| format!("{} {}", s.value, s.count))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Slot table from a `GetSlots` value; the denominations must be the standard ones
pub fn parse_slots(value: &str) -> Result<SlotTable, ProtocolError> {
    let table = parse_slot_pairs(value)
        .map(SlotTable::from_slots)
        .ok_or_else(|| invalid("cash slots", value))?;
    if !table.has_standard_layout() {
        return Err(invalid("cash slots", value));
    }
    Ok(table)
}

/// Sensor state of some slots.
///
/// The controller only says whether some slot is off; which level each
/// part has is derived from the counts.
pub fn derive_scope_state(raw: &CashState, slots: &[CashSlot]) -> CashState {
    let mut state = *raw;
    if raw.empty == EmptyLevel::Ok && raw.full == FullLevel::Ok {
        return state;
    }
    state.empty = EmptyLevel::Ok;
    state.full = FullLevel::Ok;
    for slot in slots {
        if slot.count <= NEAR_EMPTY_COUNT && state.empty != EmptyLevel::Empty {
            state.empty = if slot.count == 0 {
                EmptyLevel::Empty
            } else {
                EmptyLevel::NearEmpty
            };
        }
        if slot.count >= NEAR_FULL_COUNT && state.full != FullLevel::Full {
            state.full = if slot.count == FULL_COUNT {
                FullLevel::Full
            } else {
                FullLevel::NearFull
            };
        }
    }
    state
}

fn expect_values(values: &[String], count: usize) -> Result<(), ProtocolError> {
    if values.len() == count {
        Ok(())
    } else {
        Err(ProtocolError::ResponseMismatch {
            reason: format!("{} values for {} commands", values.len(), count),
        })
    }
}

/// `DRAWER:GetState`
#[derive(Debug, Default)]
pub struct DrawerDecoder;

impl StatusDecoder for DrawerDecoder {
    fn name(&self) -> &'static str {
        "DRAWER"
    }

    fn commands(&self) -> &'static [&'static str] {
        &["DRAWER:GetState"]
    }

    fn apply(&self, values: &[String], snapshot: &mut UdpSnapshot) -> Result<(), ProtocolError> {
        expect_values(values, 1)?;
        snapshot.drawer_open = parse_drawer(&values[0])?;
        Ok(())
    }

    fn diff(&self, previous: &UdpSnapshot, current: &UdpSnapshot, events: &mut Vec<DeviceEvent>) {
        if previous.drawer_open != current.drawer_open {
            events.push(DeviceEvent::Drawer {
                open: current.drawer_open,
            });
        }
    }
}

/// `BELT:GetState`
#[derive(Debug, Default)]
pub struct BeltDecoder;

impl StatusDecoder for BeltDecoder {
    fn name(&self) -> &'static str {
        "BELT"
    }

    fn commands(&self) -> &'static [&'static str] {
        &["BELT:GetState"]
    }

    fn apply(&self, values: &[String], snapshot: &mut UdpSnapshot) -> Result<(), ProtocolError> {
        expect_values(values, 1)?;
        snapshot.belt = parse_belt(&values[0])?;
        Ok(())
    }

    fn diff(&self, previous: &UdpSnapshot, current: &UdpSnapshot, events: &mut Vec<DeviceEvent>) {
        let (old, new) = (&previous.belt, &current.belt);
        if old.barrier_interrupted != new.barrier_interrupted {
            events.push(DeviceEvent::Belt(BeltEvent::LightBarrier {
                interrupted: new.barrier_interrupted,
            }));
        }
        if old.flap_open != new.flap_open {
            events.push(DeviceEvent::Belt(BeltEvent::SecurityFlap {
                open: new.flap_open,
            }));
        }
        if old.motor != new.motor {
            events.push(DeviceEvent::Belt(BeltEvent::Motor {
                state: new.motor,
                flap_open: new.flap_open,
            }));
        } else if old.speed != BeltSpeed::Off && new.speed == BeltSpeed::Off {
            events.push(DeviceEvent::Belt(BeltEvent::Stopped {
                auto: new.is_auto_stop_from(old),
            }));
        }
    }
}

/// `CASHBOX:GetState` and `CASHBOX:GetSlots`
#[derive(Debug, Default)]
pub struct CashboxDecoder;

/// Order in which per-scope sensor events are raised
const EVENT_SCOPES: [CashScope; 3] = [CashScope::Bills, CashScope::All, CashScope::Coins];

impl StatusDecoder for CashboxDecoder {
    fn name(&self) -> &'static str {
        "CASHBOX"
    }

    fn commands(&self) -> &'static [&'static str] {
        &["CASHBOX:GetState", "CASHBOX:GetSlots"]
    }

    fn apply(&self, values: &[String], snapshot: &mut UdpSnapshot) -> Result<(), ProtocolError> {
        expect_values(values, 2)?;
        let raw = parse_cash_state(&values[0])?;
        let slots = parse_slots(&values[1])?;
        snapshot.coins = derive_scope_state(&raw, &slots.slots()[..BILL_INDEX]);
        snapshot.bills = derive_scope_state(&raw, &slots.slots()[BILL_INDEX..]);
        snapshot.slots = slots;
        Ok(())
    }

    fn diff(&self, previous: &UdpSnapshot, current: &UdpSnapshot, events: &mut Vec<DeviceEvent>) {
        for scope in EVENT_SCOPES {
            let level = current.cash(scope).full;
            if previous.cash(scope).full != level {
                events.push(DeviceEvent::Cash(CashEvent::Full { scope, level }));
            }
        }
        for scope in EVENT_SCOPES {
            let level = current.cash(scope).empty;
            if previous.cash(scope).empty != level {
                events.push(DeviceEvent::Cash(CashEvent::Empty { scope, level }));
            }
        }
        let jammed = current.bills.operation.is_jammed();
        if previous.bills.operation.is_jammed() != jammed {
            events.push(DeviceEvent::Cash(CashEvent::Jam { jammed }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use possim_core::{PowerState, SLOT_VALUES};
    use proptest::prelude::*;

    fn slots_text(counts: &[i64; 15]) -> String {
        SLOT_VALUES
            .iter()
            .zip(counts)
            .map(|(v, c)| format!("{} {}", v, c))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_parse_belt() {
        assert_eq!(
            parse_belt("2101"),
            Ok(BeltState {
                speed: BeltSpeed::Fast,
                motor: MotorState::Overheated,
                flap_open: false,
                barrier_interrupted: true
            })
        );
        assert!(parse_belt("3000").is_err());
        assert!(parse_belt("0020").is_err());
        assert!(parse_belt("000").is_err());
    }

    #[test]
    fn test_parse_cash_state() {
        let state = parse_cash_state("013").unwrap();
        assert_eq!(state.empty, EmptyLevel::Empty);
        assert_eq!(state.full, FullLevel::NearFull);
        assert_eq!(state.operation, CashOperation::Jam);
        assert!(parse_cash_state("015").is_err());
    }

    #[test]
    fn test_parse_slots_requires_standard_layout() {
        let table = parse_slots(&slots_text(&[1; 15])).unwrap();
        assert_eq!(table.count_of(50000), Some(1));
        assert!(parse_slots("1 5 2 3").is_err());
        assert!(parse_slots("1 x").is_err());
        assert_eq!(parse_slot_pairs(" 1 5 "), Some(vec![CashSlot { value: 1, count: 5 }]));
        assert_eq!(parse_slot_pairs("1 5 2"), None);
    }

    #[test]
    fn test_derived_state_from_counts() {
        let raw = parse_cash_state("012").unwrap();
        let slots = [
            CashSlot { value: 1, count: 0 },
            CashSlot { value: 2, count: 99 },
            CashSlot { value: 5, count: 2 },
        ];
        let state = derive_scope_state(&raw, &slots);
        assert_eq!(state.empty, EmptyLevel::Empty);
        assert_eq!(state.full, FullLevel::NearFull);

        let ok = parse_cash_state("221").unwrap();
        assert_eq!(derive_scope_state(&ok, &slots), ok);
    }

    #[test]
    fn test_cashbox_apply_splits_coins_and_bills() {
        let mut counts = [50; 15];
        counts[0] = 0;
        counts[BILL_INDEX] = 100;
        let mut snapshot = UdpSnapshot::default();
        CashboxDecoder
            .apply(&["022".to_string(), slots_text(&counts)], &mut snapshot)
            .unwrap();
        assert_eq!(snapshot.coins.empty, EmptyLevel::Empty);
        assert_eq!(snapshot.coins.full, FullLevel::Ok);
        assert_eq!(snapshot.bills.full, FullLevel::Full);
        assert_eq!(snapshot.cash(CashScope::All).empty, EmptyLevel::Empty);
        assert_eq!(snapshot.cash(CashScope::All).full, FullLevel::Full);
    }

    #[test]
    fn test_cash_events_in_order() {
        let previous = UdpSnapshot {
            power: PowerState::Online,
            coins: parse_cash_state("220").unwrap(),
            bills: parse_cash_state("220").unwrap(),
            ..Default::default()
        };
        let mut current = previous.clone();
        current.bills.full = FullLevel::Full;
        current.bills.operation = CashOperation::Jam;
        current.coins.operation = CashOperation::Jam;
        let mut events = Vec::new();
        CashboxDecoder.diff(&previous, &current, &mut events);
        assert_eq!(
            events,
            vec![
                DeviceEvent::Cash(CashEvent::Full {
                    scope: CashScope::Bills,
                    level: FullLevel::Full
                }),
                DeviceEvent::Cash(CashEvent::Full {
                    scope: CashScope::All,
                    level: FullLevel::Full
                }),
                DeviceEvent::Cash(CashEvent::Jam { jammed: true }),
            ]
        );
    }

    #[test]
    fn test_belt_auto_stop() {
        let previous = UdpSnapshot {
            belt: parse_belt("1000").unwrap(),
            ..Default::default()
        };
        let current = UdpSnapshot {
            belt: parse_belt("0001").unwrap(),
            ..Default::default()
        };
        let mut events = Vec::new();
        BeltDecoder.diff(&previous, &current, &mut events);
        assert_eq!(
            events,
            vec![
                DeviceEvent::Belt(BeltEvent::LightBarrier { interrupted: true }),
                DeviceEvent::Belt(BeltEvent::Stopped { auto: true }),
            ]
        );
    }

    #[test]
    fn test_motor_change_suppresses_stop_event() {
        let previous = UdpSnapshot {
            belt: parse_belt("1000").unwrap(),
            ..Default::default()
        };
        let current = UdpSnapshot {
            belt: parse_belt("0200").unwrap(),
            ..Default::default()
        };
        let mut events = Vec::new();
        BeltDecoder.diff(&previous, &current, &mut events);
        assert_eq!(
            events,
            vec![DeviceEvent::Belt(BeltEvent::Motor {
                state: MotorState::Defective,
                flap_open: false
            })]
        );
    }

    proptest! {
        #[test]
        fn parsers_are_total(value in "\\PC{0,8}") {
            let _ = parse_drawer(&value);
            let _ = parse_belt(&value);
            let _ = parse_cash_state(&value);
            let _ = parse_slots(&value);
        }

        #[test]
        fn cash_apply_is_idempotent(state in "[012][012][01234]", counts in proptest::array::uniform15(0i64..120)) {
            let values = [state, slots_text(&counts)];
            let mut once = UdpSnapshot::default();
            CashboxDecoder.apply(&values, &mut once).unwrap();
            let mut twice = once.clone();
            CashboxDecoder.apply(&values, &mut twice).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
