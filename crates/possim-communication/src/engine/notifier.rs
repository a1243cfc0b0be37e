//! Event derivation for one poll cycle
//!
//! Ordering within a cycle:
//! 1. a power transition to a reachable state
//! 2. sub-state changes from the dialect, only when either snapshot is online
//! 3. input events read during the cycle
//! 4. a power transition to offline

use super::{Dialect, Snapshot};
use possim_core::{DeviceEvent, PowerState};

/// Events for the transition `previous -> current`
pub fn notify<D: Dialect>(
    dialect: &D,
    previous: &D::Snapshot,
    current: &D::Snapshot,
    inputs: Vec<DeviceEvent>,
) -> Vec<DeviceEvent> {
    let was = previous.power();
    let is = current.power();
    let power_changed = was != is;
    let going_offline = power_changed && is == PowerState::Offline;

    let mut events = Vec::new();
    if power_changed && !going_offline {
        events.push(DeviceEvent::Power { state: is });
    }
    if was.is_online() || is.is_online() {
        dialect.diff(previous, current, &mut events);
    }
    events.extend(inputs);
    if going_offline {
        events.push(DeviceEvent::Power { state: is });
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CommandChannel;
    use possim_core::Result;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Lamp {
        power: PowerState,
        lit: bool,
    }

    impl Snapshot for Lamp {
        fn power(&self) -> PowerState {
            self.power
        }

        fn set_power(&mut self, power: PowerState) {
            self.power = power;
        }
    }

    struct LampDialect;

    impl Dialect for LampDialect {
        type Snapshot = Lamp;

        fn name(&self) -> &'static str {
            "lamp"
        }

        fn poll(&self, _: &CommandChannel, _: &mut Lamp, _: &mut Vec<DeviceEvent>) -> Result<()> {
            Ok(())
        }

        fn diff(&self, previous: &Lamp, current: &Lamp, events: &mut Vec<DeviceEvent>) {
            if previous.lit != current.lit {
                events.push(DeviceEvent::Drawer { open: current.lit });
            }
        }
    }

    fn lamp(power: PowerState, lit: bool) -> Lamp {
        Lamp { power, lit }
    }

    #[test]
    fn test_power_up_precedes_sub_state() {
        let events = notify(
            &LampDialect,
            &lamp(PowerState::Offline, false),
            &lamp(PowerState::Online, true),
            vec![DeviceEvent::Key { unit: 1, key: 0 }],
        );
        assert_eq!(
            events,
            vec![
                DeviceEvent::Power {
                    state: PowerState::Online
                },
                DeviceEvent::Drawer { open: true },
                DeviceEvent::Key { unit: 1, key: 0 },
            ]
        );
    }

    #[test]
    fn test_offline_comes_last() {
        let events = notify(
            &LampDialect,
            &lamp(PowerState::Online, true),
            &lamp(PowerState::Offline, false),
            Vec::new(),
        );
        assert_eq!(
            events,
            vec![
                DeviceEvent::Drawer { open: false },
                DeviceEvent::Power {
                    state: PowerState::Offline
                },
            ]
        );
    }

    #[test]
    fn test_no_sub_state_events_while_unreachable() {
        let events = notify(
            &LampDialect,
            &lamp(PowerState::Offline, false),
            &lamp(PowerState::Offline, true),
            Vec::new(),
        );
        assert!(events.is_empty());

        let events = notify(
            &LampDialect,
            &lamp(PowerState::Fault, false),
            &lamp(PowerState::Fault, true),
            Vec::new(),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_unchanged_snapshot_is_silent() {
        let same = lamp(PowerState::Online, true);
        assert!(notify(&LampDialect, &same, &same, Vec::new()).is_empty());
    }
}
