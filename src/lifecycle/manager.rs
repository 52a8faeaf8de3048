//! Core lifecycle manager structure
//!
//! Provides the `LifecycleManager` struct, its collaborators, and the launch
//! path shared by create, start, restart and fork.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::Instant;

use crate::error::{DeckError, Result};
use crate::multiplexer::{LaunchSpec, Multiplexer, activity_log_path};
use crate::registry::{Instance, Registry};
use crate::scheduler::StatusScheduler;
use crate::status::{PatternReadiness, ReadinessStrategy};
use crate::types::identifiers::{ExternalSessionId, InstanceId, MuxSessionName};
use crate::types::options::DeckOptions;

use super::command::LaunchMode;
use super::guard::TransitionGuard;
use super::identity::{IdentityDetector, IdentityOutcome, IdentitySource, StateDirIdentitySource};

/// Environment variable carrying the instance id into the wrapped process
pub const INSTANCE_ENV: &str = "AGENT_DECK_INSTANCE_ID";

// ============================================================================
// LIFECYCLE MANAGER CORE
// ============================================================================

/// Start, attach, restart, fork and kill instances
///
/// The manager owns no state of its own beyond the transition guard: the
/// registry, multiplexer and scheduler are passed in explicitly and shared
/// with the rest of the deck.
pub struct LifecycleManager<M: Multiplexer> {
    pub(crate) registry: Arc<Registry>,
    pub(crate) mux: Arc<M>,
    pub(crate) scheduler: Arc<StatusScheduler<M>>,
    pub(crate) options: DeckOptions,
    pub(crate) identity: Arc<dyn IdentitySource>,
    pub(crate) readiness: Arc<dyn ReadinessStrategy>,
    pub(crate) guard: TransitionGuard,
}

impl<M: Multiplexer> LifecycleManager<M> {
    /// Manager reading identities from the tools' state directories
    pub fn new(
        registry: Arc<Registry>,
        mux: Arc<M>,
        scheduler: Arc<StatusScheduler<M>>,
        options: DeckOptions,
    ) -> Self {
        let identity = Arc::new(StateDirIdentitySource::new(options.home_dir.clone()));
        Self {
            registry,
            mux,
            scheduler,
            options,
            identity,
            readiness: Arc::new(PatternReadiness::default()),
            guard: TransitionGuard::default(),
        }
    }

    /// Replace the readiness heuristic
    #[must_use]
    pub fn with_readiness(mut self, readiness: Arc<dyn ReadinessStrategy>) -> Self {
        self.readiness = readiness;
        self
    }

    /// Replace where announced conversation ids are read from
    #[must_use]
    pub fn with_identity_source(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = identity;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<StatusScheduler<M>> {
        &self.scheduler
    }

    pub const fn options(&self) -> &DeckOptions {
        &self.options
    }

    /// Whether a terminal hand-off is in progress; redraws must wait
    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.guard.is_active()
    }

    /// Resolve duplicate conversation ids across the registry
    pub fn deduplicate(&self) -> Vec<InstanceId> {
        self.registry.deduplicate()
    }

    pub(crate) fn detector(&self) -> IdentityDetector<'_> {
        IdentityDetector {
            source: &*self.identity,
            registry: &self.registry,
            timeout: self.options.identity_timeout,
            poll_interval: self.options.identity_poll_interval,
            newest_first: false,
        }
    }

    /// Mode that continues the instance's conversation when possible
    pub(crate) fn resume_mode(instance: &Instance) -> LaunchMode {
        match instance.external_session_id() {
            Some(id) if instance.tool().supports_resume() => LaunchMode::Resume(id),
            _ => LaunchMode::Fresh,
        }
    }

    /// Create the backing session for `instance` and run identity detection
    ///
    /// Errors are returned unwrapped; callers decide whether they are start
    /// or restart failures.
    pub(crate) async fn launch(
        &self,
        instance: &Instance,
        mode: LaunchMode,
        name: MuxSessionName,
    ) -> Result<IdentityOutcome> {
        self.mux.check_available().await?;

        let tool = instance.tool();
        let command = tool.launch_command(&mode, &self.options.shell_command)?;
        let project_path = instance.project_path();

        let detector = self.detector();
        let exclude: HashSet<ExternalSessionId> = match mode {
            LaunchMode::Resume(_) => HashSet::new(),
            LaunchMode::Fresh | LaunchMode::Fork(_) => detector.snapshot(tool, &project_path),
        };

        let spec = LaunchSpec {
            name: name.clone(),
            command,
            cwd: project_path,
            env: vec![(INSTANCE_ENV.to_string(), instance.id().to_string())],
        };
        log::debug!("Launching {} as {name}: {}", instance.id().short(), spec.command);
        self.mux.create_session(&spec).await?;
        instance.bind_session(name.clone());
        self.pipe_activity(&name).await;
        self.scheduler.request_immediate(instance.id().clone());

        let outcome = match mode {
            LaunchMode::Resume(id) => IdentityOutcome::Claimed(id),
            LaunchMode::Fresh | LaunchMode::Fork(_) => detector.detect(instance, &exclude).await,
        };
        Ok(outcome)
    }

    /// Best-effort: route pane output into the session's activity log
    pub(crate) async fn pipe_activity(&self, name: &MuxSessionName) {
        if let Err(e) = tokio::fs::create_dir_all(&self.options.log_dir).await {
            log::warn!("Cannot create activity log directory: {e}");
            return;
        }
        let log_file = activity_log_path(&self.options.log_dir, name);
        if let Err(e) = self.mux.pipe_to_log(name, &log_file).await {
            log::warn!("Activity log for {name} unavailable: {e}");
        }
    }

    /// Wait until the tool looks ready, then type `prompt` and press Enter
    ///
    /// A readiness timeout is logged and the prompt is sent anyway.
    pub(crate) async fn deliver_prompt(&self, instance: &Instance, prompt: &str) -> Result<()> {
        let name = instance
            .mux_session()
            .ok_or_else(|| DeckError::session_missing(instance.id().to_string()))?;

        let deadline = Instant::now() + self.options.readiness_timeout;
        loop {
            match self.mux.capture_pane(&name).await {
                Ok(content) if self.readiness.is_ready(instance.tool(), &content) => break,
                Ok(_) => {}
                Err(e) if e.is_session_missing() => return Err(e),
                Err(e) => log::debug!("Readiness probe of {name} failed: {e}"),
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!("{name} did not look ready in time; sending prompt anyway");
                break;
            }
            tokio::time::sleep(self.options.readiness_poll_interval.min(deadline - now)).await;
        }

        self.mux.send_text(&name, prompt).await?;
        self.mux.send_enter(&name).await
    }
}
