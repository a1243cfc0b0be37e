//! Subsystem frame codec
//!
//! Frames are `<uu><letter><payload>ETX` with a two digit unit number
//! 01..05. Numbers on the wire are 1-based; decoded keys, columns and
//! rows are 0-based.

use possim_core::{ProtocolError, TouchKind};

/// Frame terminator
pub const ETX: u8 = 0x03;

/// Highest unit number
pub const MAX_UNITS: u8 = 5;

/// Longest frame accepted before a terminator must have been seen
pub const MAX_FRAME_LEN: usize = 64;

const STATE_LEN: usize = 5;
const KEY_LEN: usize = 6;
const TOUCH_LEN: usize = 8;

/// Bit of `unit` in a units mask
pub fn unit_bit(unit: u8) -> u8 {
    1 << (unit - 1)
}

/// One frame pushed by the subsystem controller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubsystemFrame {
    /// Unit went online or offline
    State {
        /// Unit number
        unit: u8,
        /// New state
        online: bool,
    },
    /// Key press on a bump bar
    Key {
        /// Unit number
        unit: u8,
        /// Key index, 0-based
        key: u8,
    },
    /// Touch on an order display
    Touch {
        /// Unit number
        unit: u8,
        /// Press or release
        kind: TouchKind,
        /// Column, 0-based
        column: u8,
        /// Row, 0-based
        row: u8,
    },
    /// Clock tick
    Clock {
        /// Unit number
        unit: u8,
        /// `m:ss`, `mm:ss` or `hh:mm:ss`; `None` when the clock is stopped
        time: Option<String>,
    },
}

impl SubsystemFrame {
    /// Unit the frame belongs to
    pub fn unit(&self) -> u8 {
        match self {
            SubsystemFrame::State { unit, .. }
            | SubsystemFrame::Key { unit, .. }
            | SubsystemFrame::Touch { unit, .. }
            | SubsystemFrame::Clock { unit, .. } => *unit,
        }
    }

    /// Decode one frame including its ETX
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.last() != Some(&ETX) {
            return Err(ProtocolError::MissingTerminator {
                frame: crate::communication::logging::escape(frame),
            });
        }
        if frame.len() < 4 {
            return Err(ProtocolError::FrameLength {
                expected: STATE_LEN,
                actual: frame.len(),
            });
        }

        let unit = two_digits(&frame[0..2], "unit")?;
        if unit == 0 || unit > MAX_UNITS {
            return Err(invalid("unit", &frame[0..2]));
        }

        match frame[2] {
            b'O' => {
                expect_len(frame, STATE_LEN)?;
                let online = match frame[3] {
                    b'0' => false,
                    b'1' => true,
                    _ => return Err(invalid("unit state", &frame[3..4])),
                };
                Ok(SubsystemFrame::State { unit, online })
            }
            b'K' => {
                expect_len(frame, KEY_LEN)?;
                let key = one_based(&frame[3..5], "key")?;
                Ok(SubsystemFrame::Key { unit, key })
            }
            letter @ (b'U' | b'D') => {
                expect_len(frame, TOUCH_LEN)?;
                let column = one_based(&frame[3..5], "column")?;
                let row = one_based(&frame[5..7], "row")?;
                let kind = if letter == b'U' {
                    TouchKind::Up
                } else {
                    TouchKind::Down
                };
                Ok(SubsystemFrame::Touch {
                    unit,
                    kind,
                    column,
                    row,
                })
            }
            b'T' => {
                let text = &frame[3..frame.len() - 1];
                if text.len() <= 1 {
                    return Ok(SubsystemFrame::Clock { unit, time: None });
                }
                if !is_clock_text(text) {
                    return Err(invalid("clock", text));
                }
                Ok(SubsystemFrame::Clock {
                    unit,
                    time: Some(String::from_utf8_lossy(text).into_owned()),
                })
            }
            _ => Err(ProtocolError::UnknownCommand {
                command: crate::communication::logging::escape(&frame[2..3]),
            }),
        }
    }

    /// Frame as the controller sends it
    pub fn encode(&self) -> Vec<u8> {
        let body = match self {
            SubsystemFrame::State { unit, online } => {
                format!("{:02}O{}", unit, if *online { 1 } else { 0 })
            }
            SubsystemFrame::Key { unit, key } => format!("{:02}K{:02}", unit, u16::from(*key) + 1),
            SubsystemFrame::Touch {
                unit,
                kind,
                column,
                row,
            } => format!(
                "{:02}{}{:02}{:02}",
                unit,
                match kind {
                    TouchKind::Up => 'U',
                    TouchKind::Down => 'D',
                },
                u16::from(*column) + 1,
                u16::from(*row) + 1
            ),
            SubsystemFrame::Clock { unit, time } => {
                format!("{:02}T{}", unit, time.as_deref().unwrap_or(" "))
            }
        };
        let mut bytes = body.into_bytes();
        bytes.push(ETX);
        bytes
    }
}

/// Command to the controller: `<uu><body>ETX`
pub fn unit_command(unit: u8, body: &str) -> Vec<u8> {
    let mut bytes = format!("{:02}{}", unit, body).into_bytes();
    bytes.push(ETX);
    bytes
}

/// Splits the byte stream into ETX-terminated frames, keeping partial frames
#[derive(Debug, Default)]
pub struct FrameSplitter {
    pending: Vec<u8>,
}

impl FrameSplitter {
    /// Create an empty splitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and return the completed frames
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolError> {
        self.pending.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == ETX) {
            frames.push(self.pending.drain(..=end).collect());
        }
        if self.pending.len() > MAX_FRAME_LEN {
            let frame = crate::communication::logging::escape(&self.pending);
            self.pending.clear();
            return Err(ProtocolError::MissingTerminator { frame });
        }
        Ok(frames)
    }

    /// Bytes of an incomplete frame
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drop the incomplete frame
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn invalid(field: &'static str, value: &[u8]) -> ProtocolError {
    ProtocolError::InvalidValue {
        field,
        value: String::from_utf8_lossy(value).into_owned(),
    }
}

fn expect_len(frame: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if frame.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::FrameLength {
            expected,
            actual: frame.len(),
        })
    }
}

fn two_digits(digits: &[u8], field: &'static str) -> Result<u8, ProtocolError> {
    match digits {
        [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => Ok((a - b'0') * 10 + (b - b'0')),
        _ => Err(invalid(field, digits)),
    }
}

fn one_based(digits: &[u8], field: &'static str) -> Result<u8, ProtocolError> {
    match two_digits(digits, field)? {
        0 => Err(invalid(field, digits)),
        n => Ok(n - 1),
    }
}

/// `m:ss`, `mm:ss` or `hh:mm:ss`
fn is_clock_text(text: &[u8]) -> bool {
    let shape: &[u8] = match text.len() {
        4 => b"d:dd",
        5 => b"dd:dd",
        8 => b"dd:dd:dd",
        _ => return false,
    };
    text.iter().zip(shape).all(|(c, s)| match s {
        b'd' => c.is_ascii_digit(),
        _ => c == s,
    })
}
