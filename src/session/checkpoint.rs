//! Persisted per-session state and its administrative summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ExecutionStatus, SharedState};

/// Compound registry key. Workflow type comes first so that identical
/// session ids under different workflow types never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub workflow_type: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(workflow_type: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workflow_type, self.session_id)
    }
}

/// Last successfully persisted state for one session.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub state: SharedState,
    pub runs: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            state: SharedState::new(session_id),
            runs: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the persisted state with the outcome of a completed run.
    pub fn commit(&mut self, state: SharedState) {
        self.state = state;
        self.runs += 1;
        self.updated_at = Utc::now();
    }
}

/// Administrative view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub key: SessionKey,
    pub message_count: usize,
    pub runs: u64,
    pub status: ExecutionStatus,
    pub current_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// A run currently holds the session lock.
    pub in_flight: bool,
}

impl SessionInfo {
    pub(crate) fn from_checkpoint(key: SessionKey, checkpoint: &Checkpoint) -> Self {
        Self {
            key,
            message_count: checkpoint.state.messages.len(),
            runs: checkpoint.runs,
            status: checkpoint.state.status,
            current_agent: checkpoint.state.current_agent.clone(),
            created_at: checkpoint.created_at,
            updated_at: checkpoint.updated_at,
            in_flight: false,
        }
    }
}
