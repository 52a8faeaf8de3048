//! Wrapped tools and their capability table
//!
//! Every tool-specific decision (can it resume, can it fork, where does it
//! announce conversation ids) is answered here instead of by comparing tool
//! names at call sites.

use std::fmt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::DeckError;

bitflags! {
    /// What a wrapped tool can do with conversation identifiers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ToolCapabilities: u8 {
        /// Can reopen a conversation by id
        const RESUME = 0b001;
        /// Can derive a new conversation from an existing id
        const FORK = 0b010;
        /// Announces its conversation id in a discoverable state file
        const IDENTITY = 0b100;
    }
}

/// Where a tool writes the files whose names carry conversation ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLayout {
    /// `<dir>/<id>.jsonl`, one directory per project
    ProjectDir(PathBuf),
    /// `<dir>/**/rollout-<timestamp>-<id>.jsonl`, shared by all projects
    RolloutTree(PathBuf),
}

/// Closed set of wrapped agent tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Claude Code
    #[default]
    Claude,
    /// OpenAI Codex CLI
    Codex,
    /// Gemini CLI
    Gemini,
    /// OpenCode
    #[serde(rename = "opencode")]
    OpenCode,
    /// Plain shell
    Shell,
}

impl Tool {
    /// All known tools
    pub const ALL: [Self; 5] = [
        Self::Claude,
        Self::Codex,
        Self::Gemini,
        Self::OpenCode,
        Self::Shell,
    ];

    /// Capability table entry for this tool
    #[must_use]
    pub const fn capabilities(self) -> ToolCapabilities {
        match self {
            Self::Claude => ToolCapabilities::all(),
            Self::Codex => ToolCapabilities::RESUME.union(ToolCapabilities::IDENTITY),
            Self::Gemini | Self::OpenCode | Self::Shell => ToolCapabilities::empty(),
        }
    }

    /// Whether conversations can be resumed by id
    #[must_use]
    pub const fn supports_resume(self) -> bool {
        self.capabilities().contains(ToolCapabilities::RESUME)
    }

    /// Whether conversations can be forked by id
    #[must_use]
    pub const fn supports_fork(self) -> bool {
        self.capabilities().contains(ToolCapabilities::FORK)
    }

    /// Whether newly announced conversation ids can be discovered
    #[must_use]
    pub const fn supports_identity(self) -> bool {
        self.capabilities().contains(ToolCapabilities::IDENTITY)
    }

    /// Executable launched for a fresh conversation
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::OpenCode => "opencode",
            Self::Shell => "",
        }
    }

    /// Location of the files announcing conversation ids for `project_path`
    #[must_use]
    pub fn identity_layout(self, home: &Path, project_path: &Path) -> Option<IdentityLayout> {
        match self {
            Self::Claude => Some(IdentityLayout::ProjectDir(
                home.join(".claude")
                    .join("projects")
                    .join(encode_project_path(project_path)),
            )),
            Self::Codex => Some(IdentityLayout::RolloutTree(
                home.join(".codex").join("sessions"),
            )),
            Self::Gemini | Self::OpenCode | Self::Shell => None,
        }
    }
}

/// Claude stores per-project state under the path with every
/// non-alphanumeric character replaced by `-`.
fn encode_project_path(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::OpenCode => "opencode",
            Self::Shell => "shell",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Tool {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "claude-code" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "gemini" => Ok(Self::Gemini),
            "opencode" => Ok(Self::OpenCode),
            "shell" | "sh" => Ok(Self::Shell),
            other => Err(DeckError::invalid_config(format!(
                "Unknown tool '{other}'. Valid options: claude, codex, gemini, opencode, shell"
            ))),
        }
    }
}
