//! Type definitions for the agent deck
//!
//! - [`identifiers`] - Type-safe ID wrappers (`InstanceId`, `ExternalSessionId`, `MuxSessionName`)
//! - [`status`] - Activity status
//! - [`tool`] - Wrapped tools and their capability table
//! - [`options`] - Runtime configuration
//! - [`record`] - Persisted instance records and refresh requests

pub mod identifiers;
pub mod options;
pub mod record;
pub mod status;
pub mod tool;

pub use identifiers::{ExternalSessionId, InstanceId, MuxSessionName};
pub use options::{DeckOptions, DeckOptionsBuilder};
pub use record::{InstanceRecord, RefreshRequest};
pub use status::Status;
pub use tool::{IdentityLayout, Tool, ToolCapabilities};
