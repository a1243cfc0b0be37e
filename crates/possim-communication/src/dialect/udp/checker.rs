//! Response checkers of the UDP controller
//!
//! Every response is `NAME:<Function><value>`, echoing the device name
//! and function of its command. The common check rejects malformed or
//! refused responses; the device checkers strip the function and
//! validate the value.

use super::status_parser::parse_slot_pairs;
use crate::engine::{CheckResult, CheckerChain, ResponseChecker};
use possim_core::SLOT_VALUES;

/// Structural check applied before any device checker
pub fn common_check(command: &[&str], response: &[&str]) -> CheckResult {
    if response.len() != 2 {
        return CheckResult::BadValue;
    }
    if command.first() != response.first() {
        return if response[0] == "INVALID" {
            CheckResult::BadCommand
        } else {
            CheckResult::BadValue
        };
    }
    if response[1].starts_with("Inv!") {
        return CheckResult::BadCommand;
    }
    CheckResult::NotMine
}

/// Function of `functions` both command and response start with
fn matching_function<'f>(command: &str, response: &str, functions: &[&'f str]) -> Option<&'f str> {
    functions
        .iter()
        .find(|f| command.starts_with(**f) && response.starts_with(**f))
        .copied()
}

/// Check a response for device `name`.
///
/// `validate` gets the function, the command arguments and the value.
fn check_device(
    command: &[&str],
    response: &[&str],
    name: &str,
    functions: &[&str],
    validate: impl Fn(&str, &str, &str) -> bool,
) -> CheckResult {
    if command.len() != 2 || command[0] != name || response.len() != 2 {
        return CheckResult::NotMine;
    }
    let Some(function) = matching_function(command[1], response[1], functions) else {
        return CheckResult::BadCommand;
    };
    let arguments = &command[1][function.len()..];
    let value = &response[1][function.len()..];
    if validate(function, arguments, value) {
        CheckResult::Valid(value.trim().to_string())
    } else {
        CheckResult::BadValue
    }
}

/// `DRAWER:GetState`, `DRAWER:Open`
#[derive(Debug, Default)]
pub struct DrawerChecker;

impl ResponseChecker for DrawerChecker {
    fn check(&self, command: &[&str], response: &[&str]) -> CheckResult {
        check_device(command, response, "DRAWER", &["GetState", "Open"], |_, _, value| {
            matches!(value, "0" | "1")
        })
    }
}

/// `BELT:GetState`, `BELT:Speed<n>`
#[derive(Debug, Default)]
pub struct BeltChecker;

impl ResponseChecker for BeltChecker {
    fn check(&self, command: &[&str], response: &[&str]) -> CheckResult {
        check_device(command, response, "BELT", &["GetState", "Speed"], |_, _, value| {
            let bytes = value.as_bytes();
            bytes.len() == 4
                && (b'0'..=b'2').contains(&bytes[0])
                && (b'0'..=b'2').contains(&bytes[1])
                && (b'0'..=b'1').contains(&bytes[2])
                && (b'0'..=b'1').contains(&bytes[3])
        })
    }
}

/// Cash box functions; the longer `GetState`/`GetSlots` come before prefixes of them
const CASHBOX_FUNCTIONS: [&str; 9] = [
    "GetState",
    "GetInput",
    "GetSlots",
    "StartInput",
    "EndInput",
    "CancelInput",
    "StopInput",
    "AddSlots",
    "Output",
];

/// `CASHBOX:*`
#[derive(Debug, Default)]
pub struct CashboxChecker;

impl CashboxChecker {
    fn is_standard_table(value: &str) -> bool {
        parse_slot_pairs(value).is_some_and(|slots| {
            slots.len() == SLOT_VALUES.len() && slots.iter().zip(SLOT_VALUES).all(|(s, v)| s.value == v)
        })
    }

    /// Echo of the added pairs: same values at the same positions
    fn is_echo(arguments: &str, value: &str) -> bool {
        match (parse_slot_pairs(arguments), parse_slot_pairs(value)) {
            (Some(sent), Some(echoed)) => {
                !sent.is_empty()
                    && sent.len() == echoed.len()
                    && sent.iter().zip(&echoed).all(|(s, e)| s.value == e.value)
            }
            _ => false,
        }
    }

    fn is_cash_state(value: &str) -> bool {
        let bytes = value.as_bytes();
        bytes.len() == 3
            && (b'0'..=b'2').contains(&bytes[0])
            && (b'0'..=b'2').contains(&bytes[1])
            && (b'0'..=b'4').contains(&bytes[2])
    }
}

impl ResponseChecker for CashboxChecker {
    fn check(&self, command: &[&str], response: &[&str]) -> CheckResult {
        check_device(
            command,
            response,
            "CASHBOX",
            &CASHBOX_FUNCTIONS,
            |function, arguments, value| match function {
                "GetSlots" => Self::is_standard_table(value),
                "AddSlots" => Self::is_standard_table(value) || Self::is_echo(arguments, value),
                "GetState" => Self::is_cash_state(value),
                _ => value.trim().parse::<u64>().is_ok(),
            },
        )
    }
}

/// Chain used for every request to the controller
pub fn checker_chain() -> CheckerChain {
    CheckerChain::new()
        .with(common_check)
        .with(DrawerChecker)
        .with(BeltChecker)
        .with(CashboxChecker)
}
