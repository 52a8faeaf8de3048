//! Readiness strategies
//!
//! Deciding that a freshly launched tool is ready for input depends on what
//! the tool prints, which changes between tool versions. The deck therefore
//! only talks to the [`ReadinessStrategy`] trait; the built-in pattern table
//! is a default, not a complete list.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{DeckError, Result};
use crate::types::tool::Tool;

/// Decides whether a tool's visible content means it accepts input
pub trait ReadinessStrategy: Send + Sync {
    /// Whether `content` shows `tool` waiting for input
    fn is_ready(&self, tool: Tool, content: &str) -> bool;
}

/// Treats every session as ready immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl ReadinessStrategy for AlwaysReady {
    fn is_ready(&self, _tool: Tool, _content: &str) -> bool {
        true
    }
}

/// Ready when any of the tool's patterns matches the visible content
///
/// Tools without patterns are ready as soon as they print anything.
#[derive(Debug, Clone)]
pub struct PatternReadiness {
    patterns: HashMap<Tool, Vec<Regex>>,
}

impl PatternReadiness {
    /// Empty table
    #[must_use]
    pub fn empty() -> Self {
        Self {
            patterns: HashMap::new(),
        }
    }

    /// Add a pattern for `tool`
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the pattern does not compile
    pub fn with_pattern(mut self, tool: Tool, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| DeckError::invalid_config(format!("bad readiness pattern for {tool}: {e}")))?;
        self.patterns.entry(tool).or_default().push(regex);
        Ok(self)
    }
}

impl Default for PatternReadiness {
    /// Markers observed in current tool releases
    fn default() -> Self {
        let table: &[(Tool, &str)] = &[
            (Tool::Claude, r"\? for shortcuts"),
            (Tool::Claude, r"(?m)^\s*[│|]\s*>\s"),
            (Tool::Codex, r"(?m)^\s*▌"),
            (Tool::Codex, r"send\s+.*newline"),
            (Tool::Gemini, r"Type your message"),
            (Tool::OpenCode, r"(?i)ctrl\+p\s+commands"),
            (Tool::Shell, r"[$#%>]\s*$"),
        ];
        let mut patterns: HashMap<Tool, Vec<Regex>> = HashMap::new();
        for (tool, pattern) in table {
            // The table is static; a pattern that fails to compile is skipped.
            match Regex::new(pattern) {
                Ok(regex) => patterns.entry(*tool).or_default().push(regex),
                Err(e) => log::error!("Invalid built-in readiness pattern for {tool}: {e}"),
            }
        }
        Self { patterns }
    }
}

impl ReadinessStrategy for PatternReadiness {
    fn is_ready(&self, tool: Tool, content: &str) -> bool {
        match self.patterns.get(&tool) {
            Some(patterns) if !patterns.is_empty() => {
                patterns.iter().any(|p| p.is_match(content.trim_end()))
            }
            _ => !content.trim().is_empty(),
        }
    }
}
