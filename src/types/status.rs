//! Activity status of an instance

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current activity state of a wrapped process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Content stable and already seen by the user
    #[default]
    Idle,
    /// Content changed since the previous probe
    Running,
    /// Content stabilized since the user last looked
    Waiting,
    /// Backing session gone or process dead
    Error,
}

impl Status {
    /// Whether the instance wants the user's attention
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self, Self::Waiting | Self::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}
