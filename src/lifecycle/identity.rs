//! Identity detection for freshly launched sessions
//!
//! Wrapped tools announce their conversation id asynchronously by creating
//! a state file whose name carries it. Detection snapshots every id that is
//! already claimed or already announced before launch, then polls for an id
//! outside that snapshot and claims it through the registry. Claims are
//! atomic, so two launches racing for the same new id never both win.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{DeckError, Result};
use crate::registry::{Instance, Registry};
use crate::types::identifiers::ExternalSessionId;
use crate::types::tool::{IdentityLayout, Tool};

/// Where conversation ids announced by wrapped tools are discovered
pub trait IdentitySource: Send + Sync {
    /// Ids announced by `tool` for `project_path`, oldest first
    ///
    /// # Errors
    /// Returns error if the tool state cannot be read
    fn announced(&self, tool: Tool, project_path: &Path) -> Result<Vec<ExternalSessionId>>;
}

/// Reads the tool's own state directory under a home directory
#[derive(Debug, Clone)]
pub struct StateDirIdentitySource {
    home: PathBuf,
}

impl StateDirIdentitySource {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl IdentitySource for StateDirIdentitySource {
    fn announced(&self, tool: Tool, project_path: &Path) -> Result<Vec<ExternalSessionId>> {
        match tool.identity_layout(&self.home, project_path) {
            None => Ok(Vec::new()),
            Some(IdentityLayout::ProjectDir(dir)) => project_dir_ids(&dir),
            Some(IdentityLayout::RolloutTree(root)) => Ok(rollout_tree_ids(&root)),
        }
    }
}

fn project_dir_ids(dir: &Path) -> Result<Vec<ExternalSessionId>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found: Vec<(SystemTime, ExternalSessionId)> = Vec::new();
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        found.push((modified(&path), ExternalSessionId::new(stem)));
    }
    Ok(oldest_first(found))
}

fn rollout_tree_ids(root: &Path) -> Vec<ExternalSessionId> {
    let found = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let id = rollout_id(entry.path())?;
            Some((modified(entry.path()), id))
        })
        .collect();
    oldest_first(found)
}

/// `rollout-<timestamp>-<uuid>.jsonl` -> `<uuid>`
fn rollout_id(path: &Path) -> Option<ExternalSessionId> {
    if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if !stem.starts_with("rollout-") {
        return None;
    }
    let tail = stem.get(stem.len().checked_sub(36)?..)?;
    Uuid::parse_str(tail).ok()?;
    Some(ExternalSessionId::new(tail))
}

fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn oldest_first(mut found: Vec<(SystemTime, ExternalSessionId)>) -> Vec<ExternalSessionId> {
    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    found.into_iter().map(|(_, id)| id).collect()
}

/// Result of one detection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// A new id was claimed
    Claimed(ExternalSessionId),
    /// Nothing new appeared in time; the instance stays without an id
    TimedOut,
    /// The tool never announces ids
    NotSupported,
    /// The instance left the registry while detection ran
    Abandoned,
}

impl IdentityOutcome {
    /// The claimed id, if any
    #[must_use]
    pub const fn claimed(&self) -> Option<&ExternalSessionId> {
        match self {
            Self::Claimed(id) => Some(id),
            _ => None,
        }
    }
}

/// Polls an identity source for ids outside a pre-launch snapshot
pub(crate) struct IdentityDetector<'a> {
    pub source: &'a dyn IdentitySource,
    pub registry: &'a Registry,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Try the most recently announced ids first
    pub newest_first: bool,
}

impl IdentityDetector<'_> {
    /// Ids a detection for `tool` in `project_path` must never claim
    ///
    /// Taken before launching: every id held by any instance plus every id
    /// the tool already announced there.
    pub fn snapshot(&self, tool: Tool, project_path: &Path) -> HashSet<ExternalSessionId> {
        let mut exclude = self.registry.claimed_external_ids();
        if tool.supports_identity() {
            match self.source.announced(tool, project_path) {
                Ok(ids) => exclude.extend(ids),
                Err(e) => log::debug!("Identity snapshot for {tool} incomplete: {e}"),
            }
        }
        exclude
    }

    /// Wait for a new id and claim it for `instance`
    pub async fn detect(
        &self,
        instance: &Instance,
        exclude: &HashSet<ExternalSessionId>,
    ) -> IdentityOutcome {
        let tool = instance.tool();
        if !tool.supports_identity() {
            instance.set_needs_identity(false);
            return IdentityOutcome::NotSupported;
        }

        let project_path = instance.project_path();
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.source.announced(tool, &project_path) {
                Ok(mut candidates) => {
                    if self.newest_first {
                        candidates.reverse();
                    }
                    for candidate in candidates {
                        if candidate.is_empty() || exclude.contains(&candidate) {
                            continue;
                        }
                        match self.registry.claim_external_id(instance.id(), candidate.clone()) {
                            Ok(true) => {
                                log::info!(
                                    "Instance {} announced conversation {candidate}",
                                    instance.id().short()
                                );
                                return IdentityOutcome::Claimed(candidate);
                            }
                            Ok(false) => {}
                            Err(_) => return IdentityOutcome::Abandoned,
                        }
                    }
                }
                Err(e) => log::debug!("Identity poll for {} failed: {e}", instance.id().short()),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }

        log::warn!("{}", DeckError::IdentityDetectionTimeout(instance.id().clone()));
        instance.set_needs_identity(true);
        IdentityOutcome::TimedOut
    }
}
