//! Error types for the agent deck

use thiserror::Error;

use crate::types::identifiers::InstanceId;

/// Main error type for session orchestration
#[derive(Error, Debug)]
pub enum DeckError {
    /// Multiplexer runtime unreachable (tmux missing or its server not answering)
    #[error("Multiplexer unavailable: {0}")]
    Availability(String),

    /// One session failed to start
    #[error("Failed to start instance {instance}: {cause}")]
    Start {
        /// Instance that failed to start
        instance: InstanceId,
        /// Underlying failure
        #[source]
        cause: Box<DeckError>,
    },

    /// One session failed to restart; the instance itself is kept
    #[error("Failed to restart instance {instance}: {cause}")]
    Restart {
        /// Instance that failed to restart
        instance: InstanceId,
        /// Underlying failure
        #[source]
        cause: Box<DeckError>,
    },

    /// A terminal hand-off was requested while another one was in progress
    #[error("Attach requested while another terminal hand-off is in progress")]
    AttachRace,

    /// No new conversation identifier appeared before the deadline
    #[error("No conversation identifier announced for instance {0} in time")]
    IdentityDetectionTimeout(InstanceId),

    /// A single-instance refresh failed inside a batch
    #[error("Refresh of instance {instance} failed: {message}")]
    Worker {
        /// Instance being refreshed
        instance: InstanceId,
        /// Error message
        message: String,
    },

    /// Instance is not in the registry
    #[error("Instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// The backing multiplexer session no longer exists
    #[error("Multiplexer session missing: {0}")]
    SessionMissing(String),

    /// The multiplexer rejected a command
    #[error("Multiplexer command failed: {0}")]
    Command(String),

    /// The tool does not offer the requested capability
    #[error("{tool} does not support {capability}")]
    Unsupported {
        /// Tool name
        tool: String,
        /// Capability name
        capability: &'static str,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading or saving persisted state
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem notification error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Result type alias for deck operations
pub type Result<T> = std::result::Result<T, DeckError>;

impl DeckError {
    /// Create an availability error
    pub fn availability(msg: impl Into<String>) -> Self {
        Self::Availability(msg.into())
    }

    /// Wrap a failure as a start error of `instance`
    #[must_use]
    pub fn start(instance: &InstanceId, cause: Self) -> Self {
        Self::Start {
            instance: instance.clone(),
            cause: Box::new(cause),
        }
    }

    /// Wrap a failure as a restart error of `instance`
    #[must_use]
    pub fn restart(instance: &InstanceId, cause: Self) -> Self {
        Self::Restart {
            instance: instance.clone(),
            cause: Box::new(cause),
        }
    }

    /// Create a worker fault
    pub fn worker(instance: &InstanceId, msg: impl Into<String>) -> Self {
        Self::Worker {
            instance: instance.clone(),
            message: msg.into(),
        }
    }

    /// Create an instance-not-found error
    #[must_use]
    pub fn instance_not_found(instance: &InstanceId) -> Self {
        Self::InstanceNotFound(instance.clone())
    }

    /// Create a missing-session error
    pub fn session_missing(name: impl Into<String>) -> Self {
        Self::SessionMissing(name.into())
    }

    /// Create a multiplexer command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create an unsupported-capability error
    pub fn unsupported(tool: impl std::fmt::Display, capability: &'static str) -> Self {
        Self::Unsupported {
            tool: tool.to_string(),
            capability,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error needs immediate user notice and aborts session work.
    ///
    /// Only loss of the multiplexer runtime qualifies, including a start or
    /// restart that failed because of it; everything else is per-operation
    /// and lands in the latest-error slot.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Availability(_) => true,
            Self::Start { cause, .. } | Self::Restart { cause, .. } => cause.is_fatal(),
            _ => false,
        }
    }

    /// Whether the multiplexer reported the target session as gone
    #[must_use]
    pub const fn is_session_missing(&self) -> bool {
        matches!(self, Self::SessionMissing(_))
    }
}
