//! Enable/disable rewrites for a single peer block
//!
//! Only WireGuard syntax lines change comment state. Free-form comments a
//! human left inside the block keep whatever prefix they already have, so an
//! enable/disable round trip restores the block verbatim.

use super::document::{is_syntax_line, PeerBlock};

/// Requested toggle direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleMode {
    Enable,
    Disable,
}

impl ToggleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleMode::Enable => "enable",
            ToggleMode::Disable => "disable",
        }
    }
}

/// Strip one leading `#` and the whitespace after it, preserving any
/// indentation before the marker.
fn uncomment(line: &str) -> String {
    match line.find('#') {
        Some(pos) if line[..pos].trim().is_empty() => {
            let rest = line[pos + 1..].trim_start();
            format!("{}{}", &line[..pos], rest)
        }
        _ => line.to_string(),
    }
}

pub fn apply(block: &mut PeerBlock, mode: ToggleMode) {
    for line in block.lines.iter_mut() {
        if !is_syntax_line(line) {
            continue;
        }
        let commented = line.trim_start().starts_with('#');
        match mode {
            ToggleMode::Enable if commented => *line = uncomment(line),
            ToggleMode::Disable if !commented && !line.trim().is_empty() => {
                *line = format!("# {}", line);
            }
            _ => {}
        }
    }
}
