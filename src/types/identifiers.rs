//! Newtype wrappers for type safety
//!
//! Instance ids, conversation ids announced by the wrapped tool, and
//! multiplexer session names are all strings underneath; these wrappers keep
//! them from being mixed up.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Newtype Wrappers for Type Safety
// ============================================================================

/// Stable, opaque identifier of one tracked instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create an instance ID from an existing value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random instance ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Get the instance ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used in multiplexer session names and logs
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Conversation identifier announced by the wrapped agent process
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalSessionId(String);

impl ExternalSessionId {
    /// Create a conversation ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the conversation ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier carries no value
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ExternalSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExternalSessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExternalSessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Name of a multiplexer session; the weak handle to the external session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MuxSessionName(String);

impl MuxSessionName {
    /// Create a session name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the session name for an instance: `<prefix><sanitized title>_<short id>`
    #[must_use]
    pub fn for_instance(prefix: &str, title: &str, id: &InstanceId) -> Self {
        let slug: String = title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let slug = slug.trim_matches('-');
        let slug = if slug.is_empty() { "session" } else { slug };
        Self(format!("{prefix}{}_{}", &slug[..slug.len().min(24)], id.short()))
    }

    /// Get the session name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MuxSessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MuxSessionName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MuxSessionName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
