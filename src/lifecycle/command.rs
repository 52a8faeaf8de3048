//! Launch command building for wrapped tools

use crate::error::{DeckError, Result};
use crate::multiplexer::tmux::shell_quote;
use crate::types::identifiers::ExternalSessionId;
use crate::types::tool::Tool;

/// How the wrapped process should start its conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// New conversation
    Fresh,
    /// Continue an existing conversation
    Resume(ExternalSessionId),
    /// Derive a new conversation from an existing one
    Fork(ExternalSessionId),
}

impl LaunchMode {
    /// Capability name used in `Unsupported` errors
    const fn capability(&self) -> &'static str {
        match self {
            Self::Fresh => "launch",
            Self::Resume(_) => "resume",
            Self::Fork(_) => "fork",
        }
    }
}

/// Command line builder for one tool launch
pub struct CommandBuilder<'a> {
    tool: Tool,
    mode: &'a LaunchMode,
    shell_command: &'a str,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    pub const fn new(tool: Tool, mode: &'a LaunchMode, shell_command: &'a str) -> Self {
        Self {
            tool,
            mode,
            shell_command,
        }
    }

    /// Build the shell command line run inside the multiplexer session
    ///
    /// # Errors
    /// Returns `Unsupported` when the tool lacks the capability the mode needs
    pub fn build(&self) -> Result<String> {
        match (self.tool, self.mode) {
            (Tool::Shell, LaunchMode::Fresh) => Ok(self.shell_command.to_string()),
            (tool, LaunchMode::Fresh) => Ok(tool.program().to_string()),
            (Tool::Claude, LaunchMode::Resume(id)) => {
                Ok(format!("claude --resume {}", shell_quote(id.as_str())))
            }
            (Tool::Claude, LaunchMode::Fork(id)) => Ok(format!(
                "claude --resume {} --fork-session",
                shell_quote(id.as_str())
            )),
            (Tool::Codex, LaunchMode::Resume(id)) => {
                Ok(format!("codex resume {}", shell_quote(id.as_str())))
            }
            (tool, mode) => Err(DeckError::unsupported(tool, mode.capability())),
        }
    }
}

impl Tool {
    /// Command line that launches this tool in `mode`
    ///
    /// # Errors
    /// Returns `Unsupported` when the tool lacks the capability the mode needs
    pub fn launch_command(self, mode: &LaunchMode, shell_command: &str) -> Result<String> {
        CommandBuilder::new(self, mode, shell_command).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ExternalSessionId {
        ExternalSessionId::new(s)
    }

    #[test]
    fn claude_commands() {
        assert_eq!(Tool::Claude.launch_command(&LaunchMode::Fresh, "bash").unwrap(), "claude");
        assert_eq!(
            Tool::Claude
                .launch_command(&LaunchMode::Resume(id("abc-123")), "bash")
                .unwrap(),
            "claude --resume abc-123"
        );
        assert_eq!(
            Tool::Claude
                .launch_command(&LaunchMode::Fork(id("abc-123")), "bash")
                .unwrap(),
            "claude --resume abc-123 --fork-session"
        );
    }

    #[test]
    fn codex_cannot_fork() {
        assert_eq!(
            Tool::Codex
                .launch_command(&LaunchMode::Resume(id("r1")), "bash")
                .unwrap(),
            "codex resume r1"
        );
        let err = Tool::Codex
            .launch_command(&LaunchMode::Fork(id("r1")), "bash")
            .unwrap_err();
        assert!(matches!(err, DeckError::Unsupported { capability: "fork", .. }));
    }

    #[test]
    fn shell_uses_configured_command() {
        assert_eq!(Tool::Shell.launch_command(&LaunchMode::Fresh, "zsh -l").unwrap(), "zsh -l");
        assert!(Tool::Gemini
            .launch_command(&LaunchMode::Resume(id("x")), "bash")
            .is_err());
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(
            Tool::Claude
                .launch_command(&LaunchMode::Resume(id("a b")), "bash")
                .unwrap(),
            "claude --resume 'a b'"
        );
    }
}
