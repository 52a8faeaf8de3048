//! Session lifecycle
//!
//! - `manager` - the `LifecycleManager` and the shared launch path
//! - `spawn` - create, start, restart, fork, import
//! - `interaction` - attach, send text, kill, identity refresh
//! - `identity` - conversation id discovery and claiming
//! - `command` - per-tool launch command lines
//! - `guard` - terminal hand-off guard

pub mod command;
pub mod guard;
pub mod identity;
mod interaction;
mod manager;
mod spawn;

pub use command::{CommandBuilder, LaunchMode};
pub use guard::{TransitionGuard, TransitionTicket};
pub use identity::{IdentityOutcome, IdentitySource, StateDirIdentitySource};
pub use interaction::KillOutcome;
pub use manager::{INSTANCE_ENV, LifecycleManager};
pub use spawn::{NewInstance, StartReport};
