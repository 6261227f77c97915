//! Shared state threaded through one workflow run.

pub mod pairing;

pub use pairing::{normalize_tool_pairing, validate_pairing};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::FailureKind;
use crate::types::{ModelMessage, Role};

/// Execution status of the most recent agent turn.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// The unit of data threaded through a workflow run and persisted as a
/// checkpoint between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    pub session_id: String,
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub current_agent: Option<String>,
    #[serde(default)]
    pub next_agent: Option<String>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub iteration_count: usize,
    /// Messages below this index have been through compaction.
    #[serde(default)]
    pub compressed_history_marker: usize,
    /// Set when the last run ended in FAILED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl SharedState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            current_agent: None,
            next_agent: None,
            status: ExecutionStatus::Running,
            iteration_count: 0,
            compressed_history_marker: 0,
            failure: None,
        }
    }

    pub fn push(&mut self, message: ModelMessage) {
        self.messages.push(message);
    }

    /// Consume the pending delegation target.
    pub fn take_next_agent(&mut self) -> Option<String> {
        self.next_agent.take()
    }

    /// Mark the state as failed. Does nothing if it already failed.
    pub fn fail(&mut self, kind: FailureKind) {
        if self.status != ExecutionStatus::Failed {
            self.status = ExecutionStatus::Failed;
            self.failure = Some(kind);
        }
    }

    /// Prepare the state for a new inbound message.
    pub fn begin_run(&mut self) {
        self.status = ExecutionStatus::Running;
        self.next_agent = None;
        self.iteration_count = 0;
        self.failure = None;
    }

    /// Text of the most recent assistant reply.
    pub fn last_response(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.is_tool_call())
            .map(ModelMessage::text)
    }
}
