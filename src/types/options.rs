//! Deck options and configuration
//!
//! This module contains the runtime configuration for the deck, including a
//! builder pattern for easy configuration and an environment overlay for the
//! binary.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DeckError, Result};

use super::tool::Tool;

/// Redraw and refresh cadence of the foreground loop
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Non-visible instances refreshed per tick
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// How long fork/start waits for a new conversation id
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Prefix of every multiplexer session owned by the deck
pub const DEFAULT_SESSION_PREFIX: &str = "agentdeck_";

// ============================================================================
// Deck Options
// ============================================================================

/// Main options for the agent deck
#[derive(Debug, Clone)]
pub struct DeckOptions {
    /// Interval between refresh triggers and redraws
    pub tick_interval: Duration,
    /// Extra non-visible instances refreshed per tick
    pub batch_size: usize,
    /// Deadline for a freshly launched process to announce its conversation id
    pub identity_timeout: Duration,
    /// Delay between identity polls
    pub identity_poll_interval: Duration,
    /// Deadline for a freshly launched process to look ready for input
    pub readiness_timeout: Duration,
    /// Delay between readiness probes
    pub readiness_poll_interval: Duration,
    /// Minimum delay between two watcher-forced refreshes of one session
    pub activity_debounce: Duration,
    /// Prefix of multiplexer session names
    pub session_prefix: String,
    /// Root directory for deck state
    pub data_dir: PathBuf,
    /// Directory holding per-session activity logs
    pub log_dir: PathBuf,
    /// Persisted instance list
    pub state_file: PathBuf,
    /// Home directory used to locate tool state files
    pub home_dir: PathBuf,
    /// Command used for `Tool::Shell`
    pub shell_command: String,
    /// Path or name of the tmux executable
    pub tmux_binary: PathBuf,
    /// Tool used when none is given
    pub default_tool: Tool,
}

impl Default for DeckOptions {
    fn default() -> Self {
        let home_dir = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
        let data_dir = home_dir.join(".agent-deck");
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            identity_poll_interval: Duration::from_millis(200),
            readiness_timeout: Duration::from_secs(10),
            readiness_poll_interval: Duration::from_millis(250),
            activity_debounce: Duration::from_millis(250),
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            log_dir: data_dir.join("logs"),
            state_file: data_dir.join("sessions.json"),
            data_dir,
            home_dir,
            shell_command: std::env::var("SHELL").unwrap_or_else(|_| "bash".to_string()),
            tmux_binary: which::which("tmux").unwrap_or_else(|_| PathBuf::from("tmux")),
            default_tool: Tool::default(),
        }
    }
}

impl DeckOptions {
    /// Create a new builder for `DeckOptions`
    #[must_use]
    pub fn builder() -> DeckOptionsBuilder {
        DeckOptionsBuilder::default()
    }

    /// Defaults overlaid with `AGENT_DECK_*` environment variables
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a variable is malformed or the result fails validation
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a value is malformed or the result fails validation
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(dir) = lookup("AGENT_DECK_DATA_DIR") {
            builder = builder.data_dir(dir);
        }
        if let Some(value) = lookup("AGENT_DECK_BATCH_SIZE") {
            builder = builder.batch_size(parse_number("AGENT_DECK_BATCH_SIZE", &value)?);
        }
        if let Some(value) = lookup("AGENT_DECK_TICK_MS") {
            let ms = parse_number("AGENT_DECK_TICK_MS", &value)?;
            builder = builder.tick_interval(Duration::from_millis(ms as u64));
        }
        if let Some(value) = lookup("AGENT_DECK_IDENTITY_TIMEOUT_MS") {
            let ms = parse_number("AGENT_DECK_IDENTITY_TIMEOUT_MS", &value)?;
            builder = builder.identity_timeout(Duration::from_millis(ms as u64));
        }
        if let Some(prefix) = lookup("AGENT_DECK_SESSION_PREFIX") {
            builder = builder.session_prefix(prefix);
        }
        if let Some(tool) = lookup("AGENT_DECK_DEFAULT_TOOL") {
            builder = builder.default_tool(tool.parse()?);
        }

        let options = builder.build();
        options.validate()?;
        Ok(options)
    }

    /// Check option invariants
    ///
    /// # Errors
    /// Returns `InvalidConfig` describing the first violated invariant
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DeckError::invalid_config("batch_size must be at least 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(DeckError::invalid_config("tick_interval must be positive"));
        }
        if self.identity_poll_interval.is_zero() || self.readiness_poll_interval.is_zero() {
            return Err(DeckError::invalid_config("poll intervals must be positive"));
        }
        if self.session_prefix.trim().is_empty() {
            return Err(DeckError::invalid_config("session_prefix must not be empty"));
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| DeckError::invalid_config(format!("{key} must be a number, got '{value}'")))
}

// ============================================================================
// Builder for DeckOptions
// ============================================================================

/// Builder for `DeckOptions`
#[derive(Debug, Default)]
pub struct DeckOptionsBuilder {
    options: DeckOptions,
}

impl DeckOptionsBuilder {
    /// Set tick interval
    #[must_use]
    pub const fn tick_interval(mut self, interval: Duration) -> Self {
        self.options.tick_interval = interval;
        self
    }

    /// Set number of extra non-visible instances refreshed per tick
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.options.batch_size = size;
        self
    }

    /// Set identity detection deadline
    #[must_use]
    pub const fn identity_timeout(mut self, timeout: Duration) -> Self {
        self.options.identity_timeout = timeout;
        self
    }

    /// Set delay between identity polls
    #[must_use]
    pub const fn identity_poll_interval(mut self, interval: Duration) -> Self {
        self.options.identity_poll_interval = interval;
        self
    }

    /// Set readiness deadline
    #[must_use]
    pub const fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.options.readiness_timeout = timeout;
        self
    }

    /// Set delay between readiness probes
    #[must_use]
    pub const fn readiness_poll_interval(mut self, interval: Duration) -> Self {
        self.options.readiness_poll_interval = interval;
        self
    }

    /// Set watcher debounce
    #[must_use]
    pub const fn activity_debounce(mut self, debounce: Duration) -> Self {
        self.options.activity_debounce = debounce;
        self
    }

    /// Set multiplexer session prefix
    #[must_use]
    pub fn session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.session_prefix = prefix.into();
        self
    }

    /// Set data directory; log directory and state file move along with it
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.options.log_dir = dir.join("logs");
        self.options.state_file = dir.join("sessions.json");
        self.options.data_dir = dir;
        self
    }

    /// Set activity log directory
    #[must_use]
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.log_dir = dir.into();
        self
    }

    /// Set home directory used to find tool state files
    #[must_use]
    pub fn home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.home_dir = dir.into();
        self
    }

    /// Set shell command
    #[must_use]
    pub fn shell_command(mut self, command: impl Into<String>) -> Self {
        self.options.shell_command = command.into();
        self
    }

    /// Set tmux executable
    #[must_use]
    pub fn tmux_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.tmux_binary = path.into();
        self
    }

    /// Set default tool
    #[must_use]
    pub const fn default_tool(mut self, tool: Tool) -> Self {
        self.options.default_tool = tool;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> DeckOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overlay_applies_values() {
        let env: HashMap<&str, &str> = [
            ("AGENT_DECK_DATA_DIR", "/tmp/deck"),
            ("AGENT_DECK_BATCH_SIZE", "7"),
            ("AGENT_DECK_TICK_MS", "250"),
            ("AGENT_DECK_DEFAULT_TOOL", "codex"),
        ]
        .into_iter()
        .collect();

        let options =
            DeckOptions::from_lookup(|key| env.get(key).map(|v| (*v).to_string())).unwrap();
        assert_eq!(options.batch_size, 7);
        assert_eq!(options.tick_interval, Duration::from_millis(250));
        assert_eq!(options.state_file, PathBuf::from("/tmp/deck/sessions.json"));
        assert_eq!(options.log_dir, PathBuf::from("/tmp/deck/logs"));
        assert_eq!(options.default_tool, Tool::Codex);
    }

    #[test]
    fn malformed_env_value_is_rejected() {
        let result = DeckOptions::from_lookup(|key| {
            (key == "AGENT_DECK_BATCH_SIZE").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(DeckError::InvalidConfig(_))));
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let options = DeckOptions::builder().batch_size(0).build();
        assert!(options.validate().is_err());
    }
}
