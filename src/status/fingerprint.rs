//! Content fingerprint probe
//!
//! Hashes the visible text of a pane so two probes can be compared without
//! keeping the text itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 of normalized pane content, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint visible content
    ///
    /// Trailing whitespace on each line and trailing blank lines are ignored,
    /// so a resize that only pads the pane does not count as activity.
    #[must_use]
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        for line in normalized_lines(content) {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Rebuild a fingerprint from its persisted hex form
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}

fn normalized_lines(content: &str) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = content.lines().map(str::trim_end).collect();
    let keep = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
    lines.into_iter().take(keep)
}
