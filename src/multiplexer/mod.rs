//! Multiplexer runtime abstraction
//!
//! The deck never owns terminal sessions itself. It asks an external
//! multiplexer (tmux in production, a scripted fake in tests) to create,
//! inspect, and destroy named sessions, and keeps only the session name as a
//! weak handle.

pub mod tmux;

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::identifiers::MuxSessionName;

pub use tmux::TmuxMultiplexer;

/// Everything needed to create one named session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Session name
    pub name: MuxSessionName,
    /// Shell command line run inside the session
    pub command: String,
    /// Working directory
    pub cwd: PathBuf,
    /// Extra environment for the wrapped process
    pub env: Vec<(String, String)>,
}

/// One live session as reported by the multiplexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxSessionInfo {
    /// Session name
    pub name: MuxSessionName,
    /// The wrapped process exited but the pane was kept
    pub pane_dead: bool,
    /// Last activity as a unix timestamp, when reported
    pub activity: Option<i64>,
}

/// Operations consumed from the multiplexer runtime
///
/// Every method may fail with `DeckError::Availability` when the runtime is
/// unreachable; session-scoped methods fail with `DeckError::SessionMissing`
/// when the named session no longer exists.
pub trait Multiplexer: Send + Sync + 'static {
    /// Verify the runtime can be reached
    ///
    /// # Errors
    /// Returns `Availability` if it cannot
    fn check_available(&self) -> impl Future<Output = Result<()>> + Send;

    /// Create a detached named session running `spec.command`
    ///
    /// # Errors
    /// Returns error if the runtime refuses to create the session
    fn create_session(&self, spec: &LaunchSpec) -> impl Future<Output = Result<()>> + Send;

    /// List all live sessions
    ///
    /// # Errors
    /// Returns error if the runtime cannot be queried
    fn list_sessions(&self) -> impl Future<Output = Result<Vec<MuxSessionInfo>>> + Send;

    /// Capture the visible text of the session's active pane
    ///
    /// # Errors
    /// Returns error if the session is missing or the capture fails
    fn capture_pane(&self, name: &MuxSessionName)
    -> impl Future<Output = Result<String>> + Send;

    /// Type literal text into the session
    ///
    /// # Errors
    /// Returns error if the session is missing
    fn send_text(&self, name: &MuxSessionName, text: &str)
    -> impl Future<Output = Result<()>> + Send;

    /// Press Enter in the session
    ///
    /// # Errors
    /// Returns error if the session is missing
    fn send_enter(&self, name: &MuxSessionName) -> impl Future<Output = Result<()>> + Send;

    /// Destroy the session
    ///
    /// # Errors
    /// Returns error if the session is missing or cannot be killed
    fn kill_session(&self, name: &MuxSessionName) -> impl Future<Output = Result<()>> + Send;

    /// Hand the controlling terminal to the session until the user detaches
    ///
    /// # Errors
    /// Returns error if the session is missing or the hand-off fails
    fn attach(&self, name: &MuxSessionName) -> impl Future<Output = Result<()>> + Send;

    /// Append all pane output to `log_file` so writes can be observed
    ///
    /// # Errors
    /// Returns error if the session is missing
    fn pipe_to_log(
        &self,
        name: &MuxSessionName,
        log_file: &Path,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Whether the named session exists
    ///
    /// # Errors
    /// Returns error if the runtime cannot be queried
    fn has_session(&self, name: &MuxSessionName) -> impl Future<Output = Result<bool>> + Send {
        async move {
            let sessions = self.list_sessions().await?;
            Ok(sessions.iter().any(|s| &s.name == name))
        }
    }
}

/// Location of the activity log for a session
#[must_use]
pub fn activity_log_path(log_dir: &Path, name: &MuxSessionName) -> PathBuf {
    log_dir.join(format!("{}.log", name.as_str()))
}

/// Inverse of [`activity_log_path`]: the session a log file belongs to
#[must_use]
pub fn session_for_log_path(path: &Path) -> Option<MuxSessionName> {
    if path.extension().and_then(|e| e.to_str()) != Some("log") {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(MuxSessionName::from)
}
