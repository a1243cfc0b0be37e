//! Simulated controllers shared by the integration tests

#![allow(dead_code)]

use possim_communication::dialect::printer::{PrinterState, StatusByte};
use possim_communication::{ScriptedDevice, Timing};
use possim_core::SLOT_VALUES;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Short timing so offline detection takes a fraction of a second
pub fn fast_timing() -> Timing {
    Timing {
        poll_interval: Duration::from_millis(20),
        request_timeout: Duration::from_millis(60),
        max_retry: 2,
        ..Default::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Printer controller state behind a [`ScriptedDevice`]
#[derive(Clone)]
pub struct PrinterSim {
    state: Arc<Mutex<StatusByte>>,
    pub device: ScriptedDevice,
}

impl PrinterSim {
    /// Printer that is ready with the drawer closed
    pub fn new(target: &str) -> Self {
        let state = Arc::new(Mutex::new(StatusByte {
            printer: PrinterState::Ok,
            drawer_open: false,
        }));
        let device = ScriptedDevice::stream(target);
        let responder_state = state.clone();
        device.respond_with(move |frame| {
            let mut status = responder_state.lock().unwrap();
            match frame {
                b"\x1bs" => Some(vec![status.encode()]),
                b"\x1bd" => {
                    status.drawer_open = true;
                    None
                }
                _ => None,
            }
        });
        Self { state, device }
    }

    pub fn set_drawer(&self, open: bool) {
        self.state.lock().unwrap().drawer_open = open;
    }

    pub fn set_printer(&self, printer: PrinterState) {
        self.state.lock().unwrap().printer = printer;
    }

    pub fn drawer_open(&self) -> bool {
        self.state.lock().unwrap().drawer_open
    }
}

#[derive(Debug, Clone)]
struct CashboxState {
    drawer_open: bool,
    belt: [u8; 4],
    slots: [i64; 15],
    input_start: Option<[i64; 15]>,
    operation: u8,
}

/// UDP controller with drawer, belt and cash box
#[derive(Clone)]
pub struct CashboxSim {
    state: Arc<Mutex<CashboxState>>,
    pub device: ScriptedDevice,
}

impl CashboxSim {
    /// Controller with `count` pieces in every slot
    pub fn new(target: &str, count: i64) -> Self {
        let state = Arc::new(Mutex::new(CashboxState {
            drawer_open: false,
            belt: [0; 4],
            slots: [count; 15],
            input_start: None,
            operation: 0,
        }));
        let device = ScriptedDevice::datagram(target);
        let responder_state = state.clone();
        device.respond_with(move |datagram| Some(responder_state.lock().unwrap().reply(datagram)));
        Self { state, device }
    }

    /// Controller whose answers arrive `delay` after each request
    pub fn with_reply_delay(target: &str, count: i64, delay: Duration) -> Self {
        let sim = Self::new(target, count);
        let state = sim.state.clone();
        let device = sim.device.clone();
        sim.device.respond_with(move |datagram| {
            let reply = state.lock().unwrap().reply(datagram);
            let device = device.clone();
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                device.push(reply);
            });
            None
        });
        sim
    }

    pub fn count_of(&self, value: u32) -> i64 {
        let index = SLOT_VALUES.iter().position(|&v| v == value).unwrap();
        self.state.lock().unwrap().slots[index]
    }

    /// Pieces put into the box during cash input
    pub fn insert(&self, value: u32, count: i64) {
        let index = SLOT_VALUES.iter().position(|&v| v == value).unwrap();
        self.state.lock().unwrap().slots[index] += count;
    }

    pub fn set_drawer(&self, open: bool) {
        self.state.lock().unwrap().drawer_open = open;
    }

    /// Belt flags: motor digit, flap, light barrier
    pub fn set_belt_sensors(&self, motor: u8, flap_open: bool, barrier: bool) {
        let mut state = self.state.lock().unwrap();
        state.belt[1] = motor;
        state.belt[2] = u8::from(flap_open);
        state.belt[3] = u8::from(barrier);
    }

    pub fn belt_speed(&self) -> u8 {
        self.state.lock().unwrap().belt[0]
    }

    pub fn set_operation(&self, operation: u8) {
        self.state.lock().unwrap().operation = operation;
    }
}

impl CashboxState {
    fn table(&self) -> String {
        SLOT_VALUES
            .iter()
            .zip(self.slots)
            .map(|(v, c)| format!("{} {}", v, c))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn state_digits(&self) -> String {
        let empty = if self.slots.iter().any(|&c| c == 0) {
            0
        } else if self.slots.iter().any(|&c| c <= 2) {
            1
        } else {
            2
        };
        let full = if self.slots.iter().any(|&c| c >= 100) {
            0
        } else if self.slots.iter().any(|&c| c >= 98) {
            1
        } else {
            2
        };
        format!("{}{}{}", empty, full, self.operation)
    }

    fn deposited(&self) -> i64 {
        let Some(start) = self.input_start else {
            return 0;
        };
        SLOT_VALUES
            .iter()
            .zip(self.slots.iter().zip(start))
            .map(|(&v, (now, then))| i64::from(v) * (now - then))
            .sum()
    }

    fn output(&mut self, range: std::ops::Range<usize>, amount: i64) -> i64 {
        let mut rest = amount;
        for index in range.rev() {
            let value = i64::from(SLOT_VALUES[index]);
            let take = (rest / value).min(self.slots[index]);
            self.slots[index] -= take;
            rest -= take * value;
        }
        amount - rest
    }

    fn reply(&mut self, datagram: &[u8]) -> Vec<u8> {
        let text = String::from_utf8_lossy(datagram);
        let responses: Vec<String> = text.split(',').map(|c| self.answer(c)).collect();
        responses.join(",").into_bytes()
    }

    fn answer(&mut self, command: &str) -> String {
        let Some((name, function)) = command.split_once(':') else {
            return format!("INVALID:{}", command);
        };
        let value = match (name, function) {
            ("DRAWER", "GetState") => u8::from(self.drawer_open).to_string(),
            ("DRAWER", "Open") => {
                self.drawer_open = true;
                "1".to_string()
            }
            ("BELT", "GetState") => self.belt_digits(),
            ("BELT", f) if f.starts_with("Speed") => {
                if let Ok(speed) = f["Speed".len()..].parse::<u8>() {
                    if speed <= 2 {
                        self.belt[0] = speed;
                    }
                }
                return format!("BELT:Speed{}", self.belt_digits());
            }
            ("CASHBOX", "GetState") => self.state_digits(),
            ("CASHBOX", "GetSlots") => self.table(),
            ("CASHBOX", f) if f.starts_with("StartInput") => {
                self.input_start = Some(self.slots);
                self.operation = 1;
                return "CASHBOX:StartInput0".to_string();
            }
            ("CASHBOX", "StopInput") => {
                self.operation = 2;
                self.deposited().to_string()
            }
            ("CASHBOX", "EndInput") => {
                let amount = self.deposited();
                self.input_start = None;
                self.operation = 0;
                amount.to_string()
            }
            ("CASHBOX", "CancelInput") => {
                if let Some(start) = self.input_start.take() {
                    self.slots = start;
                }
                self.operation = 0;
                "0".to_string()
            }
            ("CASHBOX", f) if f.starts_with("AddSlots") => {
                let arguments = f["AddSlots".len()..].to_string();
                let numbers: Vec<i64> = arguments
                    .split_whitespace()
                    .filter_map(|n| n.parse().ok())
                    .collect();
                for pair in numbers.chunks(2) {
                    if let [value, count] = pair {
                        if let Some(index) = SLOT_VALUES.iter().position(|&v| i64::from(v) == *value) {
                            self.slots[index] += count;
                        }
                    }
                }
                return format!("CASHBOX:AddSlots{}", arguments);
            }
            ("CASHBOX", f) if f.starts_with("Output") => {
                let kind = f.as_bytes().get("Output".len()).copied();
                let amount: i64 = f
                    .get("Output".len() + 1..)
                    .and_then(|a| a.parse().ok())
                    .unwrap_or(0);
                let range = match kind {
                    Some(b'C') => 0..8,
                    Some(b'B') => 8..15,
                    _ => 0..15,
                };
                return format!("CASHBOX:Output{}", self.output(range, amount));
            }
            _ => return format!("{}:Inv!{}", name, function),
        };
        format!("{}:{}{}", name, function, value)
    }

    fn belt_digits(&self) -> String {
        self.belt.iter().map(|d| d.to_string()).collect()
    }
}
