//! Status classifier
//!
//! A pure function from (previous probe state, new observation) to the next
//! status. The instance applies the result under its own lock, so the
//! comparison and the write-back are one atomic step.

use crate::types::status::Status;

use super::fingerprint::Fingerprint;

/// Liveness of the backing session at probe time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Session exists and its process runs
    Alive,
    /// Session exists but the wrapped process exited
    Dead,
    /// Session handle is gone
    Missing,
}

/// What one probe saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Session liveness
    pub liveness: Liveness,
    /// Fingerprint of the captured content, when the session is alive
    pub fingerprint: Option<Fingerprint>,
}

impl Observation {
    /// Probe of a live session showing `content`
    #[must_use]
    pub fn alive(content: &str) -> Self {
        Self {
            liveness: Liveness::Alive,
            fingerprint: Some(Fingerprint::of(content)),
        }
    }

    /// Probe of a session whose process exited
    #[must_use]
    pub const fn dead() -> Self {
        Self {
            liveness: Liveness::Dead,
            fingerprint: None,
        }
    }

    /// Probe of a session that no longer exists
    #[must_use]
    pub const fn missing() -> Self {
        Self {
            liveness: Liveness::Missing,
            fingerprint: None,
        }
    }
}

/// Stored state the classifier compares against
#[derive(Debug, Clone, Copy)]
pub struct ProbeState<'a> {
    /// Stored fingerprint
    pub baseline: Option<&'a Fingerprint>,
    /// Whether the user has seen the stored content
    pub acknowledged: bool,
    /// Write activity was reported since the last probe
    pub fresh_activity: bool,
}

/// Classifier verdict to write back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// New status
    pub status: Status,
    /// New acknowledgment flag
    pub acknowledged: bool,
    /// New baseline; `None` keeps the stored one
    pub baseline: Option<Fingerprint>,
}

/// Classify one observation
///
/// - missing session or dead process: `Error`, stored state untouched
/// - reported write activity or changed content: `Running`, acknowledgment cleared
/// - unchanged content: `Idle` when acknowledged, otherwise `Waiting`
///
/// A first observation without a baseline counts as changed.
#[must_use]
pub fn classify(state: ProbeState<'_>, observation: Observation) -> Classification {
    let fingerprint = match (observation.liveness, observation.fingerprint) {
        (Liveness::Alive, Some(fp)) => fp,
        _ => {
            return Classification {
                status: Status::Error,
                acknowledged: state.acknowledged,
                baseline: None,
            };
        }
    };

    let changed = state.baseline != Some(&fingerprint);
    if changed || state.fresh_activity {
        return Classification {
            status: Status::Running,
            acknowledged: false,
            baseline: Some(fingerprint),
        };
    }

    Classification {
        status: if state.acknowledged {
            Status::Idle
        } else {
            Status::Waiting
        },
        acknowledged: state.acknowledged,
        baseline: None,
    }
}
