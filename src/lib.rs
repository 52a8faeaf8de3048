//! # Agent Deck
//!
//! Session orchestration core for long-running AI coding agents, each wrapped
//! in its own tmux session. The deck tracks any number of instances, keeps
//! their status fresh under a fixed per-tick budget, and offers race-free
//! attach, restart, fork and kill while the interface keeps running.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kodegen_agent_deck::{Deck, DeckOptions, NewInstance, Operation, TmuxMultiplexer, Tool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = DeckOptions::from_env()?;
//!     let mux = Arc::new(TmuxMultiplexer::new(options.tmux_binary.clone()));
//!     let (deck, mut inbox) = Deck::builder(mux, options).build();
//!
//!     deck.dispatch(Operation::Create(NewInstance::new("api", "/src/api", Tool::Claude)));
//!     if let Some(delivery) = inbox.recv().await {
//!         log::info!("{:?}", delivery.completion);
//!     }
//!
//!     deck.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Status Detection
//!
//! Every refresh fingerprints the visible pane content and compares it with
//! the stored baseline:
//!
//! - missing session or exited process: `Error`
//! - content changed, or the event watcher saw writes: `Running`
//! - content unchanged and already seen by the user: `Idle`
//! - content unchanged and not yet seen: `Waiting`
//!
//! One background worker refreshes the visible rows plus a small
//! round-robin batch of off-screen instances per tick. A trigger that
//! arrives while a batch is still running is dropped, not queued.
//!
//! ## Architecture
//!
//! - [`types`]: identifiers, tools and their capabilities, options, records
//! - [`multiplexer`]: the multiplexer seam and its tmux implementation
//! - [`status`]: fingerprint, classifier, readiness strategies
//! - [`registry`]: instances and the shared registry
//! - [`scheduler`]: the status worker and batch planning
//! - [`watcher`]: activity-log notifications
//! - [`lifecycle`]: create, start, attach, restart, fork, kill, identity detection
//! - [`driver`]: the deck, the foreground loop and typed completions
//! - [`store`]: persisted instance list
//! - [`error`]: error types and handling
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, DeckError>`](Result). Only
//! [`DeckError::is_fatal`] errors (the multiplexer is unreachable) need
//! immediate attention; background refresh failures are logged and never
//! stop the worker.

#![warn(clippy::all)]

pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod multiplexer;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod types;
pub mod watcher;

// Re-export commonly used types for external API
pub use driver::{
    Completion, Deck, DeckBuilder, DeckView, Delivery, DriverCommand, ForegroundDriver, Inbox,
    Operation, OperationKind, OperationTicket, Renderer,
};
pub use error::{DeckError, Result};
pub use lifecycle::{
    IdentityOutcome, IdentitySource, KillOutcome, LaunchMode, LifecycleManager, NewInstance,
    StartReport, StateDirIdentitySource,
};
pub use multiplexer::{LaunchSpec, Multiplexer, MuxSessionInfo, TmuxMultiplexer};
pub use registry::{Instance, Registry};
pub use scheduler::StatusScheduler;
pub use status::{AlwaysReady, Fingerprint, PatternReadiness, ReadinessStrategy};
pub use store::{JsonFileStore, SessionStore};
pub use types::{
    DeckOptions, DeckOptionsBuilder, ExternalSessionId, InstanceId, InstanceRecord,
    MuxSessionName, RefreshRequest, Status, Tool, ToolCapabilities,
};
pub use watcher::{EventWatcher, WatchMode};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
