//! Ordered document model for a WireGuard server config
//!
//! The file is parsed once into an interface preamble plus a list of peer
//! blocks, each keeping its raw lines. Rendering reproduces every line that
//! was not edited byte-for-byte; only trailing-newline termination is
//! normalized.

use crate::error::WgError;

/// Field keys that make up WireGuard peer syntax. Anything else behind a `#`
/// is treated as a human comment and never rewritten.
pub const SYNTAX_KEYS: [&str; 5] = [
    "PublicKey",
    "AllowedIPs",
    "Endpoint",
    "PersistentKeepalive",
    "PresharedKey",
];

/// One `[Peer]` block: the header line through the line before the next
/// block, plus the annotation lines (name comment, spacing) directly above it.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerBlock {
    pub leading: Vec<String>,
    pub lines: Vec<String>,
}

/// Parsed config: everything before the first peer header, then the blocks
/// in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub preamble: Vec<String>,
    pub peers: Vec<PeerBlock>,
}

/// Strip comment markers and surrounding whitespace: `"# PublicKey = x"` →
/// `"PublicKey = x"`.
pub fn comment_content(line: &str) -> &str {
    line.trim_start().trim_start_matches('#').trim()
}

/// `[Peer]` header, commented or not, case-insensitive.
pub fn is_peer_header(line: &str) -> bool {
    let content = comment_content(line);
    matches!(content.get(..6), Some(head) if head.eq_ignore_ascii_case("[peer]"))
}

/// True for lines that are peer syntax (header or a known field), whether or
/// not they are currently commented out.
pub fn is_syntax_line(line: &str) -> bool {
    if is_peer_header(line) {
        return true;
    }
    let content = comment_content(line);
    match content.split_once('=') {
        Some((key, _)) => SYNTAX_KEYS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(key.trim())),
        None => false,
    }
}

/// Blank lines and free-form comments: the lines a peer block may carry as
/// its annotation run. A commented-out field still belongs to its own block.
fn is_annotation(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    trimmed.starts_with('#') && !is_syntax_line(line)
}

impl PeerBlock {
    /// Human-readable name: nearest non-empty comment directly above the
    /// header, with any `Name:` prefix removed. A blank line ends the search.
    pub fn name(&self) -> Option<String> {
        for line in self.leading.iter().rev() {
            if line.trim().is_empty() {
                break;
            }
            let content = comment_content(line);
            if content.is_empty() {
                continue;
            }
            let lower = content.to_ascii_lowercase();
            if let Some(rest) = lower.strip_prefix("name:") {
                let offset = content.len() - rest.len();
                return Some(content[offset..].trim().to_string());
            }
            return Some(content.to_string());
        }
        None
    }

    pub fn field(&self, key: &str) -> Option<String> {
        for line in &self.lines {
            let content = comment_content(line);
            if let Some((k, v)) = content.split_once('=') {
                if k.trim().eq_ignore_ascii_case(key) {
                    return Some(v.trim().to_string());
                }
            }
        }
        None
    }

    pub fn public_key(&self) -> Option<String> {
        self.field("PublicKey")
    }

    pub fn allowed_ips(&self) -> Vec<String> {
        self.field("AllowedIPs")
            .map(|v| {
                v.split(',')
                    .map(|ip| ip.trim().to_string())
                    .filter(|ip| !ip.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Enabled state is structural: any uncommented non-blank line means the
    /// block is live.
    pub fn enabled(&self) -> bool {
        self.lines
            .iter()
            .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
    }

    /// Exact identifier match against the name or the public key.
    pub fn matches(&self, identifier: &str) -> bool {
        self.name().as_deref() == Some(identifier)
            || self.public_key().as_deref() == Some(identifier)
    }
}

impl Document {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();

        // Segment on peer headers.
        let mut preamble: Vec<String> = Vec::new();
        let mut peers: Vec<PeerBlock> = Vec::new();
        let mut current: Option<PeerBlock> = None;
        for line in lines {
            if is_peer_header(line) {
                if let Some(block) = current.take() {
                    peers.push(block);
                }
                current = Some(PeerBlock {
                    leading: Vec::new(),
                    lines: vec![line.to_string()],
                });
            } else if let Some(block) = current.as_mut() {
                block.lines.push(line.to_string());
            } else {
                preamble.push(line.to_string());
            }
        }
        if let Some(block) = current.take() {
            peers.push(block);
        }

        // Reattach each block's trailing annotation run (name comment,
        // spacing) to the block that follows it.
        for i in (0..peers.len()).rev() {
            let tail = {
                let prev_lines: &mut Vec<String> = if i == 0 {
                    &mut preamble
                } else {
                    &mut peers[i - 1].lines
                };
                let mut split = prev_lines.len();
                // Never detach the previous block's own header line.
                let floor = if i == 0 { 0 } else { 1 };
                while split > floor && is_annotation(&prev_lines[split - 1]) {
                    split -= 1;
                }
                prev_lines.split_off(split)
            };
            peers[i].leading = tail;
        }

        Document { preamble, peers }
    }

    /// Render back to text, newline-terminated unless empty.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self
            .preamble
            .iter()
            .chain(self.peers.iter().flat_map(|p| p.leading.iter().chain(&p.lines)))
        {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Locate the single block an identifier resolves to. Zero matches and
    /// multiple matches are both reported, never guessed around.
    pub fn find(&self, identifier: &str) -> Result<usize, WgError> {
        let mut matches = self
            .peers
            .iter()
            .enumerate()
            .filter(|(_, p)| p.matches(identifier))
            .map(|(i, _)| i);
        match (matches.next(), matches.next()) {
            (Some(i), None) => Ok(i),
            (Some(_), Some(_)) => Err(WgError::AmbiguousIdentifier(identifier.to_string())),
            (None, _) => Err(WgError::PeerNotFound(identifier.to_string())),
        }
    }

    /// Remove a block and its annotation run, leaving a single blank line so
    /// the neighbors keep their spacing.
    pub fn remove(&mut self, index: usize) {
        self.peers.remove(index);
        if index == 0 {
            self.preamble.push(String::new());
        } else {
            self.peers[index - 1].lines.push(String::new());
        }
    }
}
