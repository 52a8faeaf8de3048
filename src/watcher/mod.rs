//! Event watcher over per-session activity logs
//!
//! Every managed session pipes its pane output into
//! `<log_dir>/<session name>.log`. A write to one of those files flags the
//! owning instance with fresh activity and forces its refresh through the
//! scheduler, outside the regular tick cadence.
//!
//! The OS notification thread only forwards paths into a channel; all
//! instance updates happen on a tokio task through the instance's own
//! accessors. If the notification facility cannot be set up the watcher
//! runs degraded and the deck relies on scheduled polling alone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::multiplexer::session_for_log_path;
use crate::registry::Registry;
use crate::scheduler::UrgentRefresh;
use crate::types::identifiers::InstanceId;

/// How activity is being detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// File notifications are delivered
    Live,
    /// Notifications unavailable; scheduled polling only
    Degraded,
}

/// Watches activity logs and nudges matching instances
pub struct EventWatcher {
    mode: WatchMode,
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl EventWatcher {
    /// Start watching `log_dir`
    ///
    /// Never fails: any setup error is logged and yields a degraded watcher.
    pub fn start(
        log_dir: &Path,
        registry: Arc<Registry>,
        urgent: UrgentRefresh,
        debounce: Duration,
    ) -> Self {
        let (path_tx, path_rx) = mpsc::unbounded_channel();
        let watcher = match watch_dir(log_dir, path_tx) {
            Ok(watcher) => watcher,
            Err(e) => {
                log::warn!(
                    "Activity watcher unavailable for {}: {e}; falling back to polling",
                    log_dir.display()
                );
                return Self::degraded();
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatch_events(
            path_rx,
            registry,
            urgent,
            debounce,
            cancel.clone(),
        ));
        log::debug!("Watching activity logs in {}", log_dir.display());

        Self {
            mode: WatchMode::Live,
            watcher: Some(watcher),
            task: Some(task),
            cancel,
        }
    }

    /// Watcher that never reports activity
    #[must_use]
    pub fn degraded() -> Self {
        Self {
            mode: WatchMode::Degraded,
            watcher: None,
            task: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> WatchMode {
        self.mode
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.mode == WatchMode::Degraded
    }

    /// Stop delivering notifications and wait for the dispatch task
    pub async fn stop(&mut self) {
        // Dropping the OS watcher closes the path channel.
        self.watcher.take();
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            log::warn!("Activity watcher task ended abnormally: {e}");
        }
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn watch_dir(log_dir: &Path, path_tx: mpsc::UnboundedSender<PathBuf>) -> Result<RecommendedWatcher> {
    std::fs::create_dir_all(log_dir)?;
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
            for path in event.paths {
                let _ = path_tx.send(path);
            }
        }
        Ok(_) => {}
        Err(e) => log::debug!("Activity watcher error: {e}"),
    })?;
    watcher.watch(log_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

async fn dispatch_events(
    mut path_rx: mpsc::UnboundedReceiver<PathBuf>,
    registry: Arc<Registry>,
    urgent: UrgentRefresh,
    debounce: Duration,
    cancel: CancellationToken,
) {
    let mut last_forced: HashMap<InstanceId, Instant> = HashMap::new();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            path = path_rx.recv() => {
                let Some(path) = path else { break };
                let Some(name) = session_for_log_path(&path) else { continue };
                let Some(instance) = registry.find_by_session(&name) else {
                    log::trace!("Activity for unknown session {name}");
                    continue;
                };

                instance.mark_fresh_activity();

                let now = Instant::now();
                let due = last_forced
                    .get(instance.id())
                    .is_none_or(|at| now.duration_since(*at) >= debounce);
                if due {
                    last_forced.insert(instance.id().clone(), now);
                    if urgent.send(instance.id().clone()).is_err() {
                        log::debug!("Status worker gone; activity watcher stopping");
                        break;
                    }
                }
            }
        }
    }
}
