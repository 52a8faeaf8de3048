//! The deck: every core component wired together
//!
//! `Deck` is the interface the foreground loop talks to. Reads are cheap
//! snapshots; everything with unbounded latency is dispatched to a tokio
//! task whose typed result lands in the foreground inbox.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::lifecycle::{IdentitySource, LifecycleManager};
use crate::multiplexer::Multiplexer;
use crate::registry::Registry;
use crate::scheduler::StatusScheduler;
use crate::status::ReadinessStrategy;
use crate::types::identifiers::InstanceId;
use crate::types::options::DeckOptions;
use crate::types::record::{InstanceRecord, RefreshRequest};
use crate::watcher::{EventWatcher, WatchMode};

use super::operation::{Completion, Delivery, Operation, OperationTicket};

/// Receiving end of the foreground inbox
pub type Inbox = mpsc::UnboundedReceiver<Delivery>;

/// Builder for [`Deck`]
pub struct DeckBuilder<M: Multiplexer> {
    mux: Arc<M>,
    options: DeckOptions,
    records: Vec<InstanceRecord>,
    identity: Option<Arc<dyn IdentitySource>>,
    readiness: Option<Arc<dyn ReadinessStrategy>>,
    watch_activity: bool,
}

impl<M: Multiplexer> DeckBuilder<M> {
    /// Persisted instances to start from
    #[must_use]
    pub fn records(mut self, records: Vec<InstanceRecord>) -> Self {
        self.records = records;
        self
    }

    #[must_use]
    pub fn identity_source(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn readiness(mut self, readiness: Arc<dyn ReadinessStrategy>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Whether to watch activity logs (default: yes)
    #[must_use]
    pub const fn watch_activity(mut self, enabled: bool) -> Self {
        self.watch_activity = enabled;
        self
    }

    /// Load the registry, spawn the worker and the watcher
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> (Deck<M>, Inbox) {
        let (registry, cleared) = Registry::from_records(self.records);
        if !cleared.is_empty() {
            log::warn!(
                "{} instances lost a duplicate conversation id on load",
                cleared.len()
            );
        }
        let registry = Arc::new(registry);

        let scheduler = Arc::new(StatusScheduler::spawn(
            Arc::clone(&registry),
            Arc::clone(&self.mux),
            self.options.batch_size,
        ));

        let watcher = if self.watch_activity {
            EventWatcher::start(
                &self.options.log_dir,
                Arc::clone(&registry),
                scheduler.urgent_sender(),
                self.options.activity_debounce,
            )
        } else {
            EventWatcher::degraded()
        };

        let mut lifecycle = LifecycleManager::new(
            Arc::clone(&registry),
            self.mux,
            Arc::clone(&scheduler),
            self.options,
        );
        if let Some(identity) = self.identity {
            lifecycle = lifecycle.with_identity_source(identity);
        }
        if let Some(readiness) = self.readiness {
            lifecycle = lifecycle.with_readiness(readiness);
        }

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let deck = Deck {
            registry,
            scheduler,
            lifecycle: Arc::new(lifecycle),
            watcher: tokio::sync::Mutex::new(watcher),
            inbox_tx,
            next_seq: AtomicU64::new(1),
        };
        (deck, inbox_rx)
    }
}

/// Registry, status worker, lifecycle manager and event watcher
pub struct Deck<M: Multiplexer> {
    registry: Arc<Registry>,
    scheduler: Arc<StatusScheduler<M>>,
    lifecycle: Arc<LifecycleManager<M>>,
    watcher: tokio::sync::Mutex<EventWatcher>,
    inbox_tx: mpsc::UnboundedSender<Delivery>,
    next_seq: AtomicU64,
}

impl<M: Multiplexer> Deck<M> {
    /// Start building a deck over `mux`
    pub fn builder(mux: Arc<M>, options: DeckOptions) -> DeckBuilder<M> {
        DeckBuilder {
            mux,
            options,
            records: Vec::new(),
            identity: None,
            readiness: None,
            watch_activity: true,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<StatusScheduler<M>> {
        &self.scheduler
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager<M>> {
        &self.lifecycle
    }

    /// Current state of every instance, in registry order
    #[must_use]
    pub fn snapshot(&self) -> Vec<InstanceRecord> {
        self.registry.records()
    }

    /// Ask the status worker for a batch; never waits
    pub fn trigger_refresh(&self, request: RefreshRequest) -> bool {
        self.scheduler.trigger_refresh(request)
    }

    /// Resolve duplicate conversation ids
    pub fn deduplicate(&self) -> Vec<InstanceId> {
        self.lifecycle.deduplicate()
    }

    /// Whether redraws must wait for a terminal hand-off
    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.lifecycle.is_transitioning()
    }

    /// Activity detection mode, or `None` while the watcher is being stopped
    #[must_use]
    pub fn watch_mode(&self) -> Option<WatchMode> {
        self.watcher.try_lock().ok().map(|w| w.mode())
    }

    /// Run `operation` in the background; its result arrives in the inbox
    pub fn dispatch(&self, operation: Operation) -> OperationTicket {
        let ticket = OperationTicket {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            kind: operation.kind(),
        };
        let lifecycle = Arc::clone(&self.lifecycle);
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let completion = execute(&lifecycle, operation).await;
            if inbox.send(Delivery { ticket, completion }).is_err() {
                log::debug!("Inbox closed; dropping result of operation {}", ticket.seq);
            }
        });
        ticket
    }

    /// Stop the watcher, then the worker after its in-flight batch
    pub async fn shutdown(&self) {
        self.watcher.lock().await.stop().await;
        self.scheduler.shutdown().await;
    }
}

async fn execute<M: Multiplexer>(lifecycle: &LifecycleManager<M>, operation: Operation) -> Completion {
    match operation {
        Operation::Create(request) => Completion::Created(lifecycle.create(request).await),
        Operation::Start(id) => Completion::Started(lifecycle.start(&id).await),
        Operation::Attach(id) => {
            let result = lifecycle.attach(&id).await;
            Completion::Attached { id, result }
        }
        Operation::Restart(id) => Completion::Restarted(lifecycle.restart(&id).await),
        Operation::Fork {
            source,
            title,
            group_path,
        } => Completion::Forked(lifecycle.fork(&source, title, group_path).await),
        Operation::Kill(id) => Completion::Killed(lifecycle.kill(&id).await),
        Operation::Import {
            name,
            tool,
            title,
            project_path,
        } => Completion::Imported(lifecycle.import(name, tool, title, project_path).await),
        Operation::RedetectIdentity(id) => {
            let result = lifecycle.redetect_identity(&id).await;
            Completion::IdentityRedetected { id, result }
        }
        Operation::SendText { id, text } => {
            let result = lifecycle.send_text(&id, &text).await;
            Completion::TextSent { id, result }
        }
    }
}
