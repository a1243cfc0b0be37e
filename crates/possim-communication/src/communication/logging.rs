//! I/O trace formatting

use serde::{Deserialize, Serialize};

/// How transports render bytes in trace output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingMode {
    /// No I/O tracing
    None,
    /// Printable ASCII as is, control bytes as `\xNN`
    #[default]
    Escape,
    /// Space separated hex pairs
    Hex,
}

impl LoggingMode {
    /// Render `data`, or `None` when tracing is off
    pub fn render(self, data: &[u8]) -> Option<String> {
        match self {
            LoggingMode::None => None,
            LoggingMode::Escape => Some(escape(data)),
            LoggingMode::Hex => Some(
                data.iter()
                    .map(|b| format!("{:02X}", b))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }
}

/// Printable ASCII verbatim, everything else as `\xNN`
pub fn escape(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if (0x20..0x7f).contains(&b) && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02X}", b));
        }
    }
    out
}

/// Trace one transfer on `target`
pub(crate) fn trace_io(target: &str, direction: &str, mode: LoggingMode, data: &[u8]) {
    if let Some(text) = mode.render(data) {
        tracing::trace!("{} {} {}", target, direction, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_mode() {
        assert_eq!(
            LoggingMode::Escape.render(b"\x1bs0").as_deref(),
            Some("\\x1Bs0")
        );
        assert_eq!(escape(b"a\\b"), "a\\x5Cb");
    }

    #[test]
    fn test_hex_mode() {
        assert_eq!(
            LoggingMode::Hex.render(&[0x1b, 0x64]).as_deref(),
            Some("1B 64")
        );
    }

    #[test]
    fn test_none_mode() {
        assert!(LoggingMode::None.render(b"x").is_none());
    }
}
