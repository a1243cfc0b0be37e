//! Printer command encoding
//!
//! Commands are ESC (`0x1B`) followed by a command letter and its
//! parameter bytes. Payload formatting is not part of this module;
//! pre-formatted print data is passed through unchanged.

use possim_core::ProtocolError;

/// Escape byte starting every command
pub const ESC: u8 = 0x1b;

/// Position of the cartridge byte within the normalize sequence
pub const COLOR_INDEX: usize = 5;

/// Color cartridge selected by normalize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cartridge {
    /// Primary color
    #[default]
    Primary,
    /// Any other color
    Secondary,
}

impl Cartridge {
    fn as_byte(self) -> u8 {
        match self {
            Cartridge::Primary => b'0',
            Cartridge::Secondary => b'1',
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Cartridge::Primary),
            b'1' => Some(Cartridge::Secondary),
            _ => None,
        }
    }
}

/// Commands understood by the printer controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrinterCommand {
    /// Request the status byte
    StatusRequest,
    /// Open the cash drawer
    DrawerOpen,
    /// Reset bold, color, font and underline
    Normalize(Cartridge),
}

impl PrinterCommand {
    /// Wire bytes of this command
    pub fn encode(&self) -> Vec<u8> {
        match self {
            PrinterCommand::StatusRequest => vec![ESC, b's'],
            PrinterCommand::DrawerOpen => vec![ESC, b'd'],
            PrinterCommand::Normalize(cartridge) => {
                let mut bytes = NORMALIZE.to_vec();
                bytes[COLOR_INDEX] = cartridge.as_byte();
                bytes
            }
        }
    }

    /// Parse one command as the controller would
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match bytes {
            [ESC, b's'] => Ok(PrinterCommand::StatusRequest),
            [ESC, b'd'] => Ok(PrinterCommand::DrawerOpen),
            _ if bytes.len() == NORMALIZE.len() => {
                let matches_template = bytes
                    .iter()
                    .zip(NORMALIZE.iter())
                    .enumerate()
                    .all(|(i, (b, n))| i == COLOR_INDEX || b == n);
                match Cartridge::from_byte(bytes[COLOR_INDEX]) {
                    Some(cartridge) if matches_template => Ok(PrinterCommand::Normalize(cartridge)),
                    _ => Err(unknown(bytes)),
                }
            }
            _ => Err(unknown(bytes)),
        }
    }
}

const NORMALIZE: [u8; 12] = [
    ESC, b'b', b'0', ESC, b'c', b'0', ESC, b'o', b'l', ESC, b'u', b'0',
];

fn unknown(bytes: &[u8]) -> ProtocolError {
    ProtocolError::UnknownCommand {
        command: crate::communication::logging::escape(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_commands() {
        assert_eq!(PrinterCommand::StatusRequest.encode(), b"\x1bs".to_vec());
        assert_eq!(PrinterCommand::DrawerOpen.encode(), b"\x1bd".to_vec());
    }

    #[test]
    fn test_normalize_cartridge_byte() {
        assert_eq!(
            PrinterCommand::Normalize(Cartridge::Primary).encode(),
            b"\x1bb0\x1bc0\x1bol\x1bu0".to_vec()
        );
        let secondary = PrinterCommand::Normalize(Cartridge::Secondary).encode();
        assert_eq!(secondary[COLOR_INDEX], b'1');
    }

    #[test]
    fn test_decode_inverts_encode() {
        for command in [
            PrinterCommand::StatusRequest,
            PrinterCommand::DrawerOpen,
            PrinterCommand::Normalize(Cartridge::Primary),
            PrinterCommand::Normalize(Cartridge::Secondary),
        ] {
            assert_eq!(PrinterCommand::decode(&command.encode()), Ok(command));
        }
    }

    #[test]
    fn test_decode_rejects_unknown() {
        assert!(matches!(
            PrinterCommand::decode(b"\x1bx"),
            Err(ProtocolError::UnknownCommand { .. })
        ));
        assert!(PrinterCommand::decode(b"\x1bb0\x1bc2\x1bol\x1bu0").is_err());
        assert!(PrinterCommand::decode(b"").is_err());
    }
}
