//! Session/workflow registry: one isolated checkpoint per
//! (workflow type, session id) pair.

pub mod checkpoint;
pub mod registry;

pub use checkpoint::{Checkpoint, SessionInfo, SessionKey};
pub use registry::{RegistryStats, SessionGuard, SessionRegistry, SessionSlot};
