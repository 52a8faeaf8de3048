//! Status detection
//!
//! - `fingerprint` - stable hash of visible pane content
//! - `classifier` - pure status transition function
//! - `readiness` - replaceable "ready for input" heuristics

pub mod classifier;
pub mod fingerprint;
pub mod readiness;

pub use classifier::{Classification, Liveness, Observation, ProbeState, classify};
pub use fingerprint::Fingerprint;
pub use readiness::{AlwaysReady, PatternReadiness, ReadinessStrategy};
