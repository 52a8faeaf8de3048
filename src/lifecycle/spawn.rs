//! Creating, starting, restarting, forking and importing instances

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{DeckError, Result};
use crate::multiplexer::Multiplexer;
use crate::registry::Instance;
use crate::types::identifiers::{InstanceId, MuxSessionName};
use crate::types::tool::Tool;

use super::command::LaunchMode;
use super::identity::IdentityOutcome;
use super::manager::LifecycleManager;

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// Parameters for a brand new instance
#[derive(Debug, Clone)]
pub struct NewInstance {
    /// Display title
    pub title: String,
    /// Working directory of the wrapped process
    pub project_path: PathBuf,
    /// Wrapped tool
    pub tool: Tool,
    /// Cosmetic group path
    pub group_path: String,
    /// Typed into the tool once it looks ready
    pub initial_prompt: Option<String>,
}

impl NewInstance {
    pub fn new(title: impl Into<String>, project_path: impl Into<PathBuf>, tool: Tool) -> Self {
        Self {
            title: title.into(),
            project_path: project_path.into(),
            tool,
            group_path: String::new(),
            initial_prompt: None,
        }
    }

    #[must_use]
    pub fn group(mut self, group_path: impl Into<String>) -> Self {
        self.group_path = group_path.into();
        self
    }

    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = Some(prompt.into());
        self
    }
}

/// Result of a successful create, start, restart or fork
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// Instance that was launched
    pub id: InstanceId,
    /// What identity detection found
    pub identity: IdentityOutcome,
}

// ============================================================================
// SPAWN IMPLEMENTATION
// ============================================================================

impl<M: Multiplexer> LifecycleManager<M> {
    /// Register and launch a new instance
    ///
    /// A failed launch removes the instance again.
    ///
    /// # Errors
    /// Returns `Start` if the session cannot be created
    pub async fn create(&self, request: NewInstance) -> Result<StartReport> {
        let instance = Arc::new(Instance::new(
            request.title,
            request.project_path,
            request.tool,
            request.group_path,
        ));
        let id = instance.id().clone();
        self.registry.insert(Arc::clone(&instance));
        log::info!("Creating instance {} ({})", id.short(), instance.tool());

        let name = MuxSessionName::for_instance(&self.options.session_prefix, &instance.title(), &id);
        let identity = match self.launch(&instance, LaunchMode::Fresh, name).await {
            Ok(identity) => identity,
            Err(e) => {
                self.registry.remove(&id);
                return Err(DeckError::start(&id, e));
            }
        };

        if let Some(prompt) = request.initial_prompt.as_deref()
            && let Err(e) = self.deliver_prompt(&instance, prompt).await
        {
            log::warn!("Initial prompt for {} not delivered: {e}", id.short());
        }

        Ok(StartReport { id, identity })
    }

    /// Launch the backing session of a registered instance
    ///
    /// Continues the known conversation when the tool can resume it.
    ///
    /// # Errors
    /// Returns `Start` if the session cannot be created; the instance is
    /// kept with status `Error`
    pub async fn start(&self, id: &InstanceId) -> Result<StartReport> {
        let instance = self.registry.require(id)?;
        let name = instance.mux_session().unwrap_or_else(|| {
            MuxSessionName::for_instance(&self.options.session_prefix, &instance.title(), id)
        });
        let mode = Self::resume_mode(&instance);
        match self.launch(&instance, mode, name).await {
            Ok(identity) => Ok(StartReport {
                id: id.clone(),
                identity,
            }),
            Err(e) => {
                instance.mark_error();
                Err(DeckError::start(id, e))
            }
        }
    }

    /// Tear down and recreate the backing session, keeping the instance id
    ///
    /// # Errors
    /// Returns `Restart` on failure; the instance stays registered with
    /// status `Error`
    pub async fn restart(&self, id: &InstanceId) -> Result<StartReport> {
        let instance = self.registry.require(id)?;
        let name = match instance.mux_session() {
            Some(name) => {
                match self.mux.kill_session(&name).await {
                    Ok(()) => {}
                    Err(e) if e.is_session_missing() => {}
                    Err(e) => log::warn!("Teardown of {name} before restart failed: {e}"),
                }
                name
            }
            None => MuxSessionName::for_instance(&self.options.session_prefix, &instance.title(), id),
        };

        log::info!("Restarting instance {}", id.short());
        let mode = Self::resume_mode(&instance);
        match self.launch(&instance, mode, name).await {
            Ok(identity) => Ok(StartReport {
                id: id.clone(),
                identity,
            }),
            Err(e) => {
                instance.mark_error();
                Err(DeckError::restart(id, e))
            }
        }
    }

    /// Derive a new instance from the conversation of `source`
    ///
    /// The fork inherits the source's project path and tool. Its own
    /// conversation id is detected after launch; ids claimed or announced
    /// before the launch are never taken.
    ///
    /// # Errors
    /// Returns `Unsupported` if the tool cannot fork or the source has no
    /// conversation id yet, `Start` if the launch fails
    pub async fn fork(
        &self,
        source: &InstanceId,
        title: impl Into<String>,
        group_path: impl Into<String>,
    ) -> Result<StartReport> {
        let source = self.registry.require(source)?;
        let tool = source.tool();
        if !tool.supports_fork() {
            return Err(DeckError::unsupported(tool, "fork"));
        }
        let parent = source
            .external_session_id()
            .ok_or_else(|| DeckError::unsupported(tool, "fork without a conversation id"))?;

        let instance = Arc::new(Instance::new(title, source.project_path(), tool, group_path));
        let id = instance.id().clone();
        self.registry.insert(Arc::clone(&instance));
        log::info!("Forking {} from {} into {}", parent, source.id().short(), id.short());

        let name = MuxSessionName::for_instance(&self.options.session_prefix, &instance.title(), &id);
        match self.launch(&instance, LaunchMode::Fork(parent), name).await {
            Ok(identity) => Ok(StartReport { id, identity }),
            Err(e) => {
                self.registry.remove(&id);
                Err(DeckError::start(&id, e))
            }
        }
    }

    /// Adopt an existing multiplexer session without launching anything
    ///
    /// # Errors
    /// Returns `SessionMissing` if no such session exists
    pub async fn import(
        &self,
        name: MuxSessionName,
        tool: Tool,
        title: impl Into<String>,
        project_path: impl Into<PathBuf>,
    ) -> Result<InstanceId> {
        if !self.mux.has_session(&name).await? {
            return Err(DeckError::session_missing(name.as_str()));
        }
        if let Some(existing) = self.registry.find_by_session(&name) {
            log::debug!("Session {name} already tracked as {}", existing.id().short());
            return Ok(existing.id().clone());
        }

        let instance = Arc::new(Instance::new(title, project_path, tool, String::new()));
        let id = instance.id().clone();
        instance.bind_session(name.clone());
        self.registry.insert(instance);
        self.pipe_activity(&name).await;
        self.scheduler.request_immediate(id.clone());
        log::info!("Imported session {name} as {}", id.short());
        Ok(id)
    }
}
