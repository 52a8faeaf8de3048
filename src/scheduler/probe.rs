//! Single-instance refresh

use std::collections::HashMap;

use crate::error::{DeckError, Result};
use crate::multiplexer::{Multiplexer, MuxSessionInfo};
use crate::registry::Instance;
use crate::status::Observation;
use crate::types::identifiers::MuxSessionName;
use crate::types::status::Status;

/// Live sessions keyed by name, listed once per batch
pub(crate) type SessionIndex = HashMap<MuxSessionName, MuxSessionInfo>;

pub(crate) fn index_sessions(sessions: Vec<MuxSessionInfo>) -> SessionIndex {
    sessions.into_iter().map(|s| (s.name.clone(), s)).collect()
}

/// Probe one instance and apply the classifier verdict
///
/// A session that disappears between listing and capture counts as missing.
/// An instance not bound to a session yet keeps its status untouched.
pub(crate) async fn refresh_instance<M: Multiplexer>(
    mux: &M,
    instance: &Instance,
    sessions: &SessionIndex,
) -> Result<Status> {
    let Some(name) = instance.mux_session() else {
        return Ok(instance.status());
    };
    let observation = match sessions.get(&name) {
        None => Observation::missing(),
        Some(info) if info.pane_dead => Observation::dead(),
        Some(_) => match mux.capture_pane(&name).await {
            Ok(content) => Observation::alive(&content),
            Err(e) if e.is_session_missing() => Observation::missing(),
            Err(e) => return Err(DeckError::worker(instance.id(), e.to_string())),
        },
    };

    let before = instance.status();
    let after = instance.apply_observation(observation);
    if before != after {
        log::debug!("Instance {} status {before} -> {after}", instance.id().short());
    }
    Ok(after)
}
