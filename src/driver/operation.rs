//! Operations dispatched by the foreground loop and their typed results

use std::path::PathBuf;

use crate::error::Result;
use crate::lifecycle::{IdentityOutcome, KillOutcome, NewInstance, StartReport};
use crate::types::identifiers::{InstanceId, MuxSessionName};
use crate::types::tool::Tool;

/// Work with unbounded latency, run off the foreground loop
#[derive(Debug, Clone)]
pub enum Operation {
    Create(NewInstance),
    Start(InstanceId),
    Attach(InstanceId),
    Restart(InstanceId),
    Fork {
        source: InstanceId,
        title: String,
        group_path: String,
    },
    Kill(InstanceId),
    Import {
        name: MuxSessionName,
        tool: Tool,
        title: String,
        project_path: PathBuf,
    },
    RedetectIdentity(InstanceId),
    SendText {
        id: InstanceId,
        text: String,
    },
}

/// Which operation a ticket or completion belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Start,
    Attach,
    Restart,
    Fork,
    Kill,
    Import,
    RedetectIdentity,
    SendText,
}

impl Operation {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Start(_) => OperationKind::Start,
            Self::Attach(_) => OperationKind::Attach,
            Self::Restart(_) => OperationKind::Restart,
            Self::Fork { .. } => OperationKind::Fork,
            Self::Kill(_) => OperationKind::Kill,
            Self::Import { .. } => OperationKind::Import,
            Self::RedetectIdentity(_) => OperationKind::RedetectIdentity,
            Self::SendText { .. } => OperationKind::SendText,
        }
    }
}

impl OperationKind {
    /// Whether success changes persisted state
    #[must_use]
    pub const fn mutates(self) -> bool {
        !matches!(self, Self::SendText)
    }
}

/// Handle returned by dispatch; the matching [`Delivery`] carries it back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationTicket {
    /// Dispatch sequence number, unique per deck
    pub seq: u64,
    pub kind: OperationKind,
}

/// Typed result of one operation
#[derive(Debug)]
pub enum Completion {
    Created(Result<StartReport>),
    Started(Result<StartReport>),
    Attached {
        id: InstanceId,
        result: Result<()>,
    },
    Restarted(Result<StartReport>),
    Forked(Result<StartReport>),
    Killed(Result<KillOutcome>),
    Imported(Result<InstanceId>),
    IdentityRedetected {
        id: InstanceId,
        result: Result<IdentityOutcome>,
    },
    TextSent {
        id: InstanceId,
        result: Result<()>,
    },
}

/// A completion posted to the foreground inbox
#[derive(Debug)]
pub struct Delivery {
    pub ticket: OperationTicket,
    pub completion: Completion,
}
