//! Attach, input, identity refresh and removal

use crate::error::{DeckError, Result};
use crate::multiplexer::{Multiplexer, activity_log_path};
use crate::types::identifiers::InstanceId;

use super::identity::{IdentityDetector, IdentityOutcome};
use super::manager::LifecycleManager;

/// Result of removing an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillOutcome {
    /// Removed instance
    pub id: InstanceId,
    /// Why the backing session could not be terminated, if it could not
    pub warning: Option<String>,
}

impl<M: Multiplexer> LifecycleManager<M> {
    /// Hand the terminal to the instance until the user detaches
    ///
    /// Redraws are suppressed for the whole hand-off. On return the
    /// content at detach becomes the acknowledged baseline and every
    /// instance is refreshed before the guard is released, so the next
    /// redraw shows what changed while the terminal was away.
    ///
    /// # Errors
    /// Returns `AttachRace` if a hand-off is already running, and any
    /// error the multiplexer reports for the hand-off itself
    pub async fn attach(&self, id: &InstanceId) -> Result<()> {
        let _ticket = self.guard.enter()?;
        let instance = self.registry.require(id)?;
        let name = instance
            .mux_session()
            .ok_or_else(|| DeckError::session_missing(id.to_string()))?;

        instance.begin_attach();
        log::debug!("Attaching to {name}");
        let handoff = self.mux.attach(&name).await;

        if let Err(e) = self.scheduler.settle_detach(&instance, &name).await {
            log::warn!("Refresh after detach failed: {e}");
        }
        handoff
    }

    /// Type `text` into the instance and press Enter
    ///
    /// # Errors
    /// Returns `SessionMissing` if the instance has no live session
    pub async fn send_text(&self, id: &InstanceId, text: &str) -> Result<()> {
        let instance = self.registry.require(id)?;
        let name = instance
            .mux_session()
            .ok_or_else(|| DeckError::session_missing(id.to_string()))?;
        self.mux.send_text(&name, text).await?;
        self.mux.send_enter(&name).await?;
        instance.touch();
        self.scheduler.request_immediate(id.clone());
        Ok(())
    }

    /// Remove the instance, terminating its session on a best-effort basis
    ///
    /// The instance leaves the registry even when termination fails; the
    /// failure is reported as a warning.
    ///
    /// # Errors
    /// Returns `InstanceNotFound` if the instance is not registered
    pub async fn kill(&self, id: &InstanceId) -> Result<KillOutcome> {
        let instance = self
            .registry
            .remove(id)
            .ok_or_else(|| DeckError::instance_not_found(id))?;

        let warning = match instance.mux_session() {
            None => None,
            Some(name) => {
                let warning = match self.mux.kill_session(&name).await {
                    Ok(()) => None,
                    Err(e) => {
                        log::warn!("Instance {} removed but its session was not terminated: {e}", id.short());
                        Some(e.to_string())
                    }
                };
                let log_file = activity_log_path(&self.options.log_dir, &name);
                if let Err(e) = tokio::fs::remove_file(&log_file).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    log::debug!("Activity log {} not removed: {e}", log_file.display());
                }
                warning
            }
        };

        log::info!("Removed instance {}", id.short());
        Ok(KillOutcome {
            id: id.clone(),
            warning,
        })
    }

    /// Detect the conversation id of an instance again
    ///
    /// Used for instances that lost their id to deduplication or whose
    /// detection timed out. Only ids held by other instances are excluded,
    /// so the instance can recover an id it announced earlier.
    ///
    /// # Errors
    /// Returns `InstanceNotFound` if the instance is not registered
    pub async fn redetect_identity(&self, id: &InstanceId) -> Result<IdentityOutcome> {
        let instance = self.registry.require(id)?;
        self.registry.release_external_id(id)?;
        let exclude = self.registry.claimed_external_ids();
        let detector = IdentityDetector {
            newest_first: true,
            ..self.detector()
        };
        Ok(detector.detect(&instance, &exclude).await)
    }
}
