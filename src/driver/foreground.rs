//! Foreground driver loop
//!
//! Single-threaded interactive loop: it redraws on a fixed cadence, sends
//! one refresh trigger per tick, hands user commands to the deck and
//! applies completions from the inbox. It never awaits lifecycle or
//! scheduler work inline; only shutdown waits.

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::error::{DeckError, Result};
use crate::lifecycle::IdentityOutcome;
use crate::multiplexer::Multiplexer;
use crate::store::SessionStore;
use crate::types::identifiers::InstanceId;
use crate::types::record::{InstanceRecord, RefreshRequest};
use crate::types::status::Status;
use crate::watcher::WatchMode;

use super::deck::{Deck, Inbox};
use super::operation::{Completion, Delivery, Operation};

/// Everything a renderer needs for one frame
#[derive(Debug, Clone)]
pub struct DeckView {
    /// Instances in registry order
    pub instances: Vec<InstanceRecord>,
    /// Index of the first row shown
    pub viewport_offset: usize,
    /// Number of rows shown
    pub viewport_size: usize,
    /// Latest recoverable error or warning
    pub latest_error: Option<String>,
    /// `None` while the watcher is being stopped
    pub watch_mode: Option<WatchMode>,
}

impl DeckView {
    /// Instances inside the viewport
    pub fn visible(&self) -> &[InstanceRecord] {
        let start = self.viewport_offset.min(self.instances.len());
        let end = start.saturating_add(self.viewport_size).min(self.instances.len());
        &self.instances[start..end]
    }
}

/// Draws frames; must not block
pub trait Renderer: Send {
    fn render(&mut self, view: &DeckView);
}

/// Input to the foreground loop
#[derive(Debug, Clone)]
pub enum DriverCommand {
    /// Dispatch a lifecycle operation
    Run(Operation),
    /// The user selected a row; a waiting instance counts as seen
    Select(InstanceId),
    /// Move the viewport
    Scroll { offset: usize, size: usize },
    /// Resolve duplicate conversation ids now
    Deduplicate,
    /// Redraw and trigger a refresh without waiting for the next tick
    Refresh,
    Quit,
}

/// The interactive loop around a [`Deck`]
pub struct ForegroundDriver<M: Multiplexer, R: Renderer> {
    deck: Deck<M>,
    inbox: Inbox,
    store: Box<dyn SessionStore>,
    renderer: R,
    latest_error: Option<String>,
    viewport_offset: usize,
    viewport_size: usize,
}

impl<M: Multiplexer, R: Renderer> ForegroundDriver<M, R> {
    pub fn new(deck: Deck<M>, inbox: Inbox, store: Box<dyn SessionStore>, renderer: R) -> Self {
        Self {
            deck,
            inbox,
            store,
            renderer,
            latest_error: None,
            viewport_offset: 0,
            viewport_size: usize::MAX,
        }
    }

    pub const fn deck(&self) -> &Deck<M> {
        &self.deck
    }

    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Latest recoverable error or warning
    #[must_use]
    pub fn latest_error(&self) -> Option<&str> {
        self.latest_error.as_deref()
    }

    /// Run until `Quit` or until the command channel closes, then shut down
    ///
    /// # Errors
    /// Returns error if the final state cannot be persisted
    pub async fn run(mut self, mut commands: mpsc::Receiver<DriverCommand>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.deck.lifecycle().options().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                Some(delivery) = self.inbox.recv() => {
                    self.apply(delivery);
                    self.redraw();
                }
                command = commands.recv() => match command {
                    None | Some(DriverCommand::Quit) => break,
                    Some(command) => {
                        self.handle(command);
                        self.redraw();
                    }
                },
            }
        }

        self.shutdown().await
    }

    /// Wait for the next completion, apply it and redraw
    ///
    /// Returns `false` if the inbox is closed.
    pub async fn pump(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(delivery) => {
                self.apply(delivery);
                self.redraw();
                true
            }
            None => false,
        }
    }

    /// One cadence step: trigger a refresh of the viewport and redraw
    pub fn tick(&mut self) {
        self.deck.trigger_refresh(self.refresh_request());
        self.redraw();
    }

    /// Draw a frame unless a terminal hand-off is in progress
    ///
    /// Returns whether a frame was drawn.
    pub fn redraw(&mut self) -> bool {
        if self.deck.is_transitioning() {
            return false;
        }
        let view = self.view();
        self.renderer.render(&view);
        true
    }

    /// Current frame contents
    #[must_use]
    pub fn view(&self) -> DeckView {
        DeckView {
            instances: self.deck.snapshot(),
            viewport_offset: self.viewport_offset,
            viewport_size: self.viewport_size,
            latest_error: self.latest_error.clone(),
            watch_mode: self.deck.watch_mode(),
        }
    }

    /// Apply one user command
    pub fn handle(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Run(operation) => {
                let ticket = self.deck.dispatch(operation);
                log::debug!("Dispatched {:?} as #{}", ticket.kind, ticket.seq);
            }
            DriverCommand::Select(id) => match self.deck.registry().get(&id) {
                Some(instance) => {
                    if instance.status() == Status::Waiting {
                        instance.acknowledge();
                    } else {
                        instance.touch();
                    }
                }
                None => self.record_error(&DeckError::instance_not_found(&id)),
            },
            DriverCommand::Scroll { offset, size } => {
                self.viewport_offset = offset;
                self.viewport_size = size;
                self.deck.trigger_refresh(self.refresh_request());
            }
            DriverCommand::Deduplicate => {
                let cleared = self.deck.deduplicate();
                if !cleared.is_empty() {
                    self.latest_error = Some(format!(
                        "{} instances lost a duplicate conversation id",
                        cleared.len()
                    ));
                    self.persist();
                }
            }
            DriverCommand::Refresh => {
                self.deck.trigger_refresh(self.refresh_request());
            }
            DriverCommand::Quit => {}
        }
    }

    /// Apply one completion from the inbox
    pub fn apply(&mut self, delivery: Delivery) {
        let mutated = match delivery.completion {
            Completion::Created(result)
            | Completion::Started(result)
            | Completion::Restarted(result)
            | Completion::Forked(result) => match result {
                Ok(report) => {
                    if report.identity == IdentityOutcome::TimedOut {
                        self.latest_error = Some(format!(
                            "No conversation id detected for {}",
                            report.id.short()
                        ));
                    }
                    true
                }
                // A failed start or restart leaves the instance in `Error`.
                Err(e) => {
                    self.record_error(&e);
                    true
                }
            },
            Completion::Killed(result) => match result {
                Ok(outcome) => {
                    if let Some(warning) = outcome.warning {
                        self.latest_error =
                            Some(format!("Removed {} (warning: {warning})", outcome.id.short()));
                    }
                    true
                }
                Err(e) => {
                    self.record_error(&e);
                    false
                }
            },
            Completion::Imported(result) => self.settle(result.map(drop)),
            Completion::Attached { result, .. } => {
                self.settle(result);
                true
            }
            Completion::IdentityRedetected { result, .. } => self.settle(result.map(drop)),
            Completion::TextSent { result, .. } => {
                self.settle(result);
                false
            }
        };

        if mutated && delivery.ticket.kind.mutates() {
            self.persist();
        }
    }

    fn settle(&mut self, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                self.record_error(&e);
                false
            }
        }
    }

    /// Put an error in the latest-error slot, replacing what was there
    fn record_error(&mut self, error: &DeckError) {
        if error.is_fatal() {
            log::error!("{error}");
        } else {
            log::warn!("{error}");
        }
        self.latest_error = Some(error.to_string());
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.deck.snapshot()) {
            self.record_error(&e);
        }
    }

    fn refresh_request(&self) -> RefreshRequest {
        let len = self.deck.registry().len();
        let offset = self.viewport_offset.min(len);
        let size = self.viewport_size.min(len - offset);
        RefreshRequest::viewport(offset, size)
    }

    /// Stop background work after the in-flight batch, then persist
    ///
    /// # Errors
    /// Returns error if the final state cannot be persisted
    pub async fn shutdown(self) -> Result<()> {
        self.deck.shutdown().await;
        self.store.save(&self.deck.snapshot())?;
        log::info!("Deck state saved");
        Ok(())
    }
}
