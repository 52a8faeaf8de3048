//! Background status worker
//!
//! Exactly one task refreshes statuses. The foreground loop hands it one
//! [`RefreshRequest`] per tick through a capacity-one channel; while a batch
//! is in flight further triggers are dropped rather than queued, so the
//! worst case is one batch of work at a time. The event watcher may force
//! single-instance refreshes through a separate unbounded channel.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{DeckError, Result};
use crate::multiplexer::Multiplexer;
use crate::registry::{Instance, Registry};
use crate::types::identifiers::{InstanceId, MuxSessionName};
use crate::types::record::RefreshRequest;

use super::batch::select_batch;
use super::probe::{SessionIndex, index_sessions, refresh_instance};

/// Sender the event watcher uses to force a single-instance refresh
pub type UrgentRefresh = mpsc::UnboundedSender<InstanceId>;

/// State shared between the handle and the worker task
struct WorkerShared<M: Multiplexer> {
    registry: Arc<Registry>,
    mux: Arc<M>,
    batch_size: usize,
    /// Set from an accepted trigger until its batch completes
    in_flight: AtomicBool,
    cursor: parking_lot::Mutex<usize>,
    /// Serializes batches, forced refreshes and full refreshes
    gate: tokio::sync::Mutex<()>,
    completed: watch::Sender<u64>,
}

/// Handle to the status worker
pub struct StatusScheduler<M: Multiplexer> {
    shared: Arc<WorkerShared<M>>,
    trigger_tx: mpsc::Sender<RefreshRequest>,
    urgent_tx: UrgentRefresh,
    cancel: CancellationToken,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<M: Multiplexer> StatusScheduler<M> {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(registry: Arc<Registry>, mux: Arc<M>, batch_size: usize) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (urgent_tx, urgent_rx) = mpsc::unbounded_channel();
        let (completed, _) = watch::channel(0);
        let cancel = CancellationToken::new();

        let shared = Arc::new(WorkerShared {
            registry,
            mux,
            batch_size,
            in_flight: AtomicBool::new(false),
            cursor: parking_lot::Mutex::new(0),
            gate: tokio::sync::Mutex::new(()),
            completed,
        });

        let handle = tokio::spawn(run_worker(
            Arc::clone(&shared),
            trigger_rx,
            urgent_rx,
            cancel.clone(),
        ));

        Self {
            shared,
            trigger_tx,
            urgent_tx,
            cancel,
            handle: parking_lot::Mutex::new(Some(handle)),
        }
    }

    /// Ask for one batch without waiting for it
    ///
    /// Returns `false` when the trigger was dropped because a batch is still
    /// in flight or the worker has stopped.
    pub fn trigger_refresh(&self, request: RefreshRequest) -> bool {
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("Refresh trigger dropped: batch in flight");
            return false;
        }
        if self.trigger_tx.try_send(request).is_err() {
            self.shared.in_flight.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Refresh one instance as soon as the worker is free, bypassing batching
    pub fn request_immediate(&self, id: InstanceId) -> bool {
        self.urgent_tx.send(id).is_ok()
    }

    /// Sender for forced refreshes, handed to the event watcher
    #[must_use]
    pub fn urgent_sender(&self) -> UrgentRefresh {
        self.urgent_tx.clone()
    }

    /// Whether a triggered batch has not completed yet
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Number of triggered batches completed so far
    #[must_use]
    pub fn completed_batches(&self) -> u64 {
        *self.shared.completed.borrow()
    }

    /// Watch the completed batch counter
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.completed.subscribe()
    }

    /// Refresh every instance now and wait for the result
    ///
    /// Waits for an in-flight batch first. Returns how many instances were
    /// refreshed without error.
    ///
    /// # Errors
    /// Returns error if the multiplexer cannot list its sessions
    pub async fn refresh_all(&self) -> Result<usize> {
        self.shared.refresh_all().await
    }

    /// Fold a finished terminal hand-off into the status picture
    ///
    /// Captures the pane at detach, makes it the acknowledged baseline of
    /// `instance` and refreshes every instance, all while holding the worker
    /// gate. A batch that captured before detach has applied its result by
    /// the time the baseline is written, and none can start until the full
    /// refresh is done.
    ///
    /// # Errors
    /// Returns error if the multiplexer cannot list its sessions; the
    /// baseline is written regardless
    pub async fn settle_detach(&self, instance: &Instance, name: &MuxSessionName) -> Result<usize> {
        self.shared.settle_detach(instance, name).await
    }

    /// Stop the worker, letting an in-flight batch run to completion
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            log::warn!("Status worker ended abnormally: {e}");
        }
    }
}

impl<M: Multiplexer> Drop for StatusScheduler<M> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker<M: Multiplexer>(
    shared: Arc<WorkerShared<M>>,
    mut trigger_rx: mpsc::Receiver<RefreshRequest>,
    mut urgent_rx: mpsc::UnboundedReceiver<InstanceId>,
    cancel: CancellationToken,
) {
    log::debug!("Status worker started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(id) = urgent_rx.recv() => {
                shared.refresh_one(&id).await;
            }
            Some(request) = trigger_rx.recv() => {
                shared.run_batch(&request).await;
                shared.in_flight.store(false, Ordering::Release);
                shared.completed.send_modify(|n| *n += 1);
            }
            else => break,
        }
    }
    log::debug!("Status worker stopped");
}

impl<M: Multiplexer> WorkerShared<M> {
    async fn run_batch(&self, request: &RefreshRequest) {
        let _gate = self.gate.lock().await;

        let snapshot = self.registry.snapshot();
        let order: Vec<InstanceId> = snapshot.iter().map(|i| i.id().clone()).collect();
        let cursor = *self.cursor.lock();
        let plan = select_batch(&order, request, self.batch_size, cursor);
        if plan.is_empty() {
            return;
        }

        let sessions = match self.mux.list_sessions().await {
            Ok(sessions) => index_sessions(sessions),
            Err(e) => {
                log::warn!("Status batch skipped: {e}");
                return;
            }
        };
        *self.cursor.lock() = plan.next_cursor;

        let by_id: HashMap<&InstanceId, &Arc<Instance>> =
            snapshot.iter().map(|i| (i.id(), i)).collect();
        let mut failures = 0usize;
        for id in plan.ids() {
            if let Some(instance) = by_id.get(id)
                && !self.refresh_isolated(instance, &sessions).await
            {
                failures += 1;
            }
        }
        log::trace!(
            "Status batch done: {} visible, {} round-robin, {failures} failed",
            plan.visible.len(),
            plan.round_robin.len()
        );
    }

    async fn refresh_one(&self, id: &InstanceId) {
        let _gate = self.gate.lock().await;
        let Some(instance) = self.registry.get(id) else {
            return;
        };
        match self.mux.list_sessions().await {
            Ok(sessions) => {
                self.refresh_isolated(&instance, &index_sessions(sessions)).await;
            }
            Err(e) => log::warn!("Forced refresh of {} skipped: {e}", id.short()),
        }
    }

    async fn refresh_all(&self) -> Result<usize> {
        let _gate = self.gate.lock().await;
        self.refresh_all_gated().await
    }

    async fn settle_detach(&self, instance: &Instance, name: &MuxSessionName) -> Result<usize> {
        let _gate = self.gate.lock().await;
        let content = match self.mux.capture_pane(name).await {
            Ok(content) => Some(content),
            Err(e) => {
                log::debug!("No content captured at detach from {name}: {e}");
                None
            }
        };
        instance.finish_attach(content.as_deref());
        self.refresh_all_gated().await
    }

    /// Caller holds `gate`
    async fn refresh_all_gated(&self) -> Result<usize> {
        let sessions = index_sessions(self.mux.list_sessions().await?);
        let mut refreshed = 0;
        for instance in self.registry.snapshot() {
            if self.refresh_isolated(&instance, &sessions).await {
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    /// Refresh one instance; failures and panics are logged, never propagated
    async fn refresh_isolated(&self, instance: &Instance, sessions: &SessionIndex) -> bool {
        let probe = refresh_instance(&*self.mux, instance, sessions);
        match AssertUnwindSafe(probe).catch_unwind().await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                log::warn!("{e}");
                false
            }
            Err(_) => {
                log::warn!("{}", DeckError::worker(instance.id(), "refresh panicked"));
                false
            }
        }
    }
}
