//! Plain data views of instances
//!
//! `InstanceRecord` is the persisted form of an instance and also the
//! snapshot handed to renderers; `RefreshRequest` is the per-tick message the
//! foreground loop sends to the status scheduler.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{ExternalSessionId, InstanceId, MuxSessionName};
use super::status::Status;
use super::tool::Tool;

/// Every data-model field of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Stable instance identifier
    pub id: InstanceId,
    /// Display title
    pub title: String,
    /// Working directory of the wrapped process
    pub project_path: PathBuf,
    /// Wrapped tool
    pub tool: Tool,
    /// Last classified status
    pub status: Status,
    /// Conversation id announced by the wrapped process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_session_id: Option<ExternalSessionId>,
    /// Backing multiplexer session, if one was ever created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux_session: Option<MuxSessionName>,
    /// Fingerprint of the last probed content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Whether the user has seen the current content
    #[serde(default)]
    pub acknowledged: bool,
    /// Whether the conversation id must be detected again
    #[serde(default)]
    pub needs_identity: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last time the user attached or selected the instance
    pub last_accessed_at: DateTime<Utc>,
    /// Cosmetic group path, owned by the presentation layer
    #[serde(default)]
    pub group_path: String,
}

/// One tick's refresh request from the foreground loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshRequest {
    /// Index of the first row shown
    pub viewport_offset: usize,
    /// Number of rows shown
    pub viewport_size: usize,
    /// Ids of the rows shown, top to bottom; derived from the viewport when empty
    pub visible: Vec<InstanceId>,
}

impl RefreshRequest {
    /// Request for an explicit list of visible instances
    #[must_use]
    pub fn visible(ids: Vec<InstanceId>) -> Self {
        Self {
            viewport_offset: 0,
            viewport_size: ids.len(),
            visible: ids,
        }
    }

    /// Request for a window of the registry order
    #[must_use]
    pub const fn viewport(offset: usize, size: usize) -> Self {
        Self {
            viewport_offset: offset,
            viewport_size: size,
            visible: Vec::new(),
        }
    }

    /// Request with nothing visible; only round-robin work happens
    #[must_use]
    pub const fn background() -> Self {
        Self::viewport(0, 0)
    }
}
