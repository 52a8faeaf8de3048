//! One tracked instance
//!
//! Immutable identity (id, tool, creation time) lives directly on the
//! struct; everything that changes lives behind one `parking_lot` mutex so
//! that the render path and the status worker always see a consistent view.
//! The lock is never held across an await point.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::status::{Fingerprint, Observation, ProbeState, classify};
use crate::types::identifiers::{ExternalSessionId, InstanceId, MuxSessionName};
use crate::types::record::InstanceRecord;
use crate::types::status::Status;
use crate::types::tool::Tool;

/// Mutable part of an instance
#[derive(Debug, Clone)]
struct InstanceState {
    title: String,
    project_path: PathBuf,
    group_path: String,
    status: Status,
    external_session_id: Option<ExternalSessionId>,
    mux_session: Option<MuxSessionName>,
    fingerprint: Option<Fingerprint>,
    acknowledged: bool,
    fresh_activity: bool,
    needs_identity: bool,
    attached: bool,
    last_accessed_at: DateTime<Utc>,
}

/// A tracked wrapped process
#[derive(Debug)]
pub struct Instance {
    id: InstanceId,
    tool: Tool,
    created_at: DateTime<Utc>,
    state: Mutex<InstanceState>,
}

impl Instance {
    /// New, not yet started instance
    pub fn new(
        title: impl Into<String>,
        project_path: impl Into<PathBuf>,
        tool: Tool,
        group_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: InstanceId::generate(),
            tool,
            created_at: now,
            state: Mutex::new(InstanceState {
                title: title.into(),
                project_path: project_path.into(),
                group_path: group_path.into(),
                status: Status::Idle,
                external_session_id: None,
                mux_session: None,
                fingerprint: None,
                acknowledged: false,
                fresh_activity: false,
                needs_identity: tool.supports_identity(),
                attached: false,
                last_accessed_at: now,
            }),
        }
    }

    /// Rebuild an instance from its persisted record
    #[must_use]
    pub fn from_record(record: InstanceRecord) -> Self {
        Self {
            id: record.id,
            tool: record.tool,
            created_at: record.created_at,
            state: Mutex::new(InstanceState {
                title: record.title,
                project_path: record.project_path,
                group_path: record.group_path,
                status: record.status,
                external_session_id: record.external_session_id.filter(|id| !id.is_empty()),
                mux_session: record.mux_session,
                fingerprint: record.fingerprint.map(Fingerprint::from_hex),
                acknowledged: record.acknowledged,
                fresh_activity: false,
                needs_identity: record.needs_identity,
                attached: false,
                last_accessed_at: record.last_accessed_at,
            }),
        }
    }

    /// Persistable snapshot of every field
    #[must_use]
    pub fn record(&self) -> InstanceRecord {
        let state = self.state.lock();
        InstanceRecord {
            id: self.id.clone(),
            title: state.title.clone(),
            project_path: state.project_path.clone(),
            tool: self.tool,
            status: state.status,
            external_session_id: state.external_session_id.clone(),
            mux_session: state.mux_session.clone(),
            fingerprint: state.fingerprint.as_ref().map(|fp| fp.as_str().to_string()),
            acknowledged: state.acknowledged,
            needs_identity: state.needs_identity,
            created_at: self.created_at,
            last_accessed_at: state.last_accessed_at,
            group_path: state.group_path.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------------

    /// Stable identifier
    #[must_use]
    pub const fn id(&self) -> &InstanceId {
        &self.id
    }

    /// Wrapped tool
    #[must_use]
    pub const fn tool(&self) -> Tool {
        self.tool
    }

    /// Creation time
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Display title
    #[must_use]
    pub fn title(&self) -> String {
        self.state.lock().title.clone()
    }

    /// Working directory
    #[must_use]
    pub fn project_path(&self) -> PathBuf {
        self.state.lock().project_path.clone()
    }

    /// Cosmetic group path
    #[must_use]
    pub fn group_path(&self) -> String {
        self.state.lock().group_path.clone()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    /// Announced conversation id
    #[must_use]
    pub fn external_session_id(&self) -> Option<ExternalSessionId> {
        self.state.lock().external_session_id.clone()
    }

    /// Backing multiplexer session
    #[must_use]
    pub fn mux_session(&self) -> Option<MuxSessionName> {
        self.state.lock().mux_session.clone()
    }

    /// Stored fingerprint
    #[must_use]
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.state.lock().fingerprint.clone()
    }

    /// Whether the user has seen the current content
    #[must_use]
    pub fn acknowledged(&self) -> bool {
        self.state.lock().acknowledged
    }

    /// Whether the conversation id must be detected again
    #[must_use]
    pub fn needs_identity(&self) -> bool {
        self.state.lock().needs_identity
    }

    /// Whether the terminal is currently handed to this instance
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// Last attach or selection time
    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.state.lock().last_accessed_at
    }

    // ------------------------------------------------------------------------
    // Status worker
    // ------------------------------------------------------------------------

    /// Classify a probe against the stored baseline and write the verdict back
    ///
    /// Consumes the fresh-activity flag.
    pub fn apply_observation(&self, observation: Observation) -> Status {
        let mut state = self.state.lock();
        let verdict = classify(
            ProbeState {
                baseline: state.fingerprint.as_ref(),
                acknowledged: state.acknowledged,
                fresh_activity: state.fresh_activity,
            },
            observation,
        );
        if let Some(baseline) = verdict.baseline {
            state.fingerprint = Some(baseline);
        }
        state.status = verdict.status;
        state.acknowledged = verdict.acknowledged;
        state.fresh_activity = false;
        verdict.status
    }

    /// Record write activity reported by the event watcher
    pub fn mark_fresh_activity(&self) {
        self.state.lock().fresh_activity = true;
    }

    /// Whether write activity is pending classification
    #[must_use]
    pub fn has_fresh_activity(&self) -> bool {
        self.state.lock().fresh_activity
    }

    // ------------------------------------------------------------------------
    // Foreground interaction
    // ------------------------------------------------------------------------

    /// The user has seen the current content
    pub fn acknowledge(&self) {
        let mut state = self.state.lock();
        state.acknowledged = true;
        state.last_accessed_at = Utc::now();
        if state.status == Status::Waiting {
            state.status = Status::Idle;
        }
    }

    /// Record an access without changing acknowledgment
    pub fn touch(&self) {
        self.state.lock().last_accessed_at = Utc::now();
    }

    /// Rename the instance
    pub fn set_title(&self, title: impl Into<String>) {
        self.state.lock().title = title.into();
    }

    /// Move the instance to another cosmetic group
    pub fn set_group_path(&self, group_path: impl Into<String>) {
        self.state.lock().group_path = group_path.into();
    }

    /// Terminal hand-off begins; acknowledgment stays untouched until detach
    pub(crate) fn begin_attach(&self) {
        let mut state = self.state.lock();
        state.attached = true;
        state.last_accessed_at = Utc::now();
    }

    /// Terminal hand-off ended
    ///
    /// The content on screen at detach becomes the new baseline in the same
    /// critical section that sets the acknowledgment, so no probe can see
    /// one without the other.
    pub(crate) fn finish_attach(&self, content_at_detach: Option<&str>) {
        let mut state = self.state.lock();
        state.attached = false;
        state.last_accessed_at = Utc::now();
        if let Some(content) = content_at_detach {
            state.fingerprint = Some(Fingerprint::of(content));
            state.acknowledged = true;
            state.fresh_activity = false;
            state.status = Status::Idle;
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle manager
    // ------------------------------------------------------------------------

    /// Point the instance at a freshly created session
    pub(crate) fn bind_session(&self, name: MuxSessionName) {
        let mut state = self.state.lock();
        state.mux_session = Some(name);
        state.status = Status::Running;
        state.fingerprint = None;
        state.acknowledged = false;
        state.fresh_activity = false;
    }

    /// Force the error status (failed start or restart)
    pub(crate) fn mark_error(&self) {
        self.state.lock().status = Status::Error;
    }

    /// Store or clear the conversation id; only the registry calls this
    pub(super) fn set_external_session_id(&self, id: Option<ExternalSessionId>) {
        let mut state = self.state.lock();
        state.external_session_id = id.filter(|id| !id.is_empty());
        state.needs_identity = state.external_session_id.is_none() && self.tool.supports_identity();
    }

    /// Drop a conflicting conversation id and flag the instance for detection
    pub(super) fn clear_identity_for_redetection(&self) {
        let mut state = self.state.lock();
        state.external_session_id = None;
        state.needs_identity = true;
    }

    /// Mark whether the conversation id still has to be detected
    pub(crate) fn set_needs_identity(&self, needs: bool) {
        self.state.lock().needs_identity = needs;
    }

    /// Whether the working directory matches `path`
    #[must_use]
    pub fn is_in_project(&self, path: &Path) -> bool {
        self.state.lock().project_path == path
    }
}
