//! Tmux-backed multiplexer using the external `tmux` executable

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{DeckError, Result};
use crate::types::identifiers::MuxSessionName;

use super::{LaunchSpec, MuxSessionInfo, Multiplexer};

/// Format string for `list-panes -a`: name, dead flag, activity
const LIST_FORMAT: &str = "#{session_name}\t#{pane_dead}\t#{session_activity}";

/// Tmux multiplexer driving sessions through the tmux CLI
#[derive(Debug, Clone)]
pub struct TmuxMultiplexer {
    binary: PathBuf,
}

impl TmuxMultiplexer {
    /// Create a multiplexer using the given tmux executable
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Locate tmux on `PATH`
    ///
    /// # Errors
    /// Returns `Availability` if tmux is not installed
    pub fn locate() -> Result<Self> {
        which::which("tmux")
            .map(Self::new)
            .map_err(|e| DeckError::availability(format!("tmux not found on PATH: {e}")))
    }

    /// Exact-match target for session-scoped commands
    fn session_target(name: &MuxSessionName) -> String {
        format!("={}", name.as_str())
    }

    /// Exact-match target for pane-scoped commands (active pane of the session)
    fn pane_target(name: &MuxSessionName) -> String {
        format!("={}:", name.as_str())
    }

    /// Run a tmux command and return stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DeckError::availability(format!(
                        "tmux executable {} not found",
                        self.binary.display()
                    ))
                } else {
                    DeckError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(args.first().copied().unwrap_or("tmux"), &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl Multiplexer for TmuxMultiplexer {
    async fn check_available(&self) -> Result<()> {
        self.run(&["-V"]).await.map(|version| {
            log::debug!("Using {}", version.trim());
        })
    }

    async fn create_session(&self, spec: &LaunchSpec) -> Result<()> {
        let cwd = spec.cwd.to_string_lossy();
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let mut args = vec!["new-session", "-d", "-s", spec.name.as_str(), "-c", &*cwd];
        for pair in &env {
            args.push("-e");
            args.push(pair);
        }
        if !spec.command.trim().is_empty() {
            args.push(&spec.command);
        }
        self.run(&args).await?;

        // Keep the pane after the process exits so liveness can be probed.
        let target = Self::session_target(&spec.name);
        if let Err(e) = self
            .run(&["set-option", "-t", &target, "remain-on-exit", "on"])
            .await
        {
            log::warn!("Failed to set remain-on-exit for {}: {}", spec.name, e);
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<MuxSessionInfo>> {
        match self.run(&["list-panes", "-a", "-F", LIST_FORMAT]).await {
            Ok(out) => Ok(parse_pane_listing(&out)),
            // A server with no sessions is not running at all.
            Err(e) if e.is_session_missing() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn capture_pane(&self, name: &MuxSessionName) -> Result<String> {
        let target = Self::pane_target(name);
        self.run(&["capture-pane", "-p", "-J", "-t", &target]).await
    }

    async fn send_text(&self, name: &MuxSessionName, text: &str) -> Result<()> {
        let target = Self::pane_target(name);
        self.run(&["send-keys", "-t", &target, "-l", text]).await.map(drop)
    }

    async fn send_enter(&self, name: &MuxSessionName) -> Result<()> {
        let target = Self::pane_target(name);
        self.run(&["send-keys", "-t", &target, "Enter"]).await.map(drop)
    }

    async fn kill_session(&self, name: &MuxSessionName) -> Result<()> {
        let target = Self::session_target(name);
        self.run(&["kill-session", "-t", &target]).await.map(drop)
    }

    async fn attach(&self, name: &MuxSessionName) -> Result<()> {
        let target = Self::session_target(name);
        // Inherit the terminal; TMUX is cleared so attaching from inside tmux nests.
        let status = Command::new(&self.binary)
            .args(["attach-session", "-t", &target])
            .env_remove("TMUX")
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| DeckError::availability(format!("Failed to run tmux attach: {e}")))?;

        if status.success() {
            Ok(())
        } else if self.has_session(name).await? {
            Err(DeckError::command(format!(
                "attach-session exited with {status}"
            )))
        } else {
            Err(DeckError::session_missing(name.as_str()))
        }
    }

    async fn pipe_to_log(&self, name: &MuxSessionName, log_file: &Path) -> Result<()> {
        let target = Self::pane_target(name);
        let pipe = format!("cat >> {}", shell_quote(&log_file.to_string_lossy()));
        self.run(&["pipe-pane", "-o", "-t", &target, &pipe]).await.map(drop)
    }
}

/// Map tmux stderr to the error taxonomy
fn classify_failure(command: &str, stderr: &str) -> DeckError {
    let lower = stderr.to_lowercase();
    if lower.contains("can't find session")
        || lower.contains("can't find pane")
        || lower.contains("session not found")
        || lower.contains("no such session")
        || lower.contains("no server running")
        || lower.contains("error connecting to")
    {
        DeckError::session_missing(stderr.trim())
    } else if lower.contains("server exited unexpectedly") {
        DeckError::availability(stderr.trim())
    } else {
        DeckError::command(format!("{command}: {}", stderr.trim()))
    }
}

/// Parse `list-panes -a` output; the first pane of each session wins
fn parse_pane_listing(output: &str) -> Vec<MuxSessionInfo> {
    let mut sessions: Vec<MuxSessionInfo> = Vec::new();
    for line in output.lines() {
        let mut parts = line.split('\t');
        let Some(name) = parts.next().filter(|n| !n.is_empty()) else {
            continue;
        };
        if sessions.iter().any(|s| s.name.as_str() == name) {
            continue;
        }
        let pane_dead = parts.next().is_some_and(|flag| flag.trim() == "1");
        let activity = parts.next().and_then(|ts| ts.trim().parse().ok());
        sessions.push(MuxSessionInfo {
            name: MuxSessionName::from(name),
            pane_dead,
            activity,
        });
    }
    sessions
}

/// Single-quote a value for `sh`
pub(crate) fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
