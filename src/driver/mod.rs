//! Foreground driver
//!
//! - `deck` - the component bundle and asynchronous dispatch
//! - `operation` - dispatched operations, tickets and typed completions
//! - `foreground` - the interactive loop, renderer seam and error slot

mod deck;
mod foreground;
mod operation;

pub use deck::{Deck, DeckBuilder, Inbox};
pub use foreground::{DeckView, DriverCommand, ForegroundDriver, Renderer};
pub use operation::{Completion, Delivery, Operation, OperationKind, OperationTicket};
